//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::ServiceRole;

/// Generate, install and control systemd units for a Django web server, Celery worker and Celery beat
#[derive(Parser, Debug)]
#[command(name = "unitsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory unit files are written to (overrides config)
    #[arg(long, global = true, env = "UNITSMITH_UNIT_DIR", value_hint = ValueHint::DirPath)]
    pub unit_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate input, write units and drive systemd
    Deploy {
        #[command(flatten)]
        input: DeployInput,

        /// Create the virtualenv, install requirements, collectstatic and migrate first
        #[arg(long)]
        build: bool,

        /// Enable units after writing them
        #[arg(long)]
        enable: bool,

        /// Start units after writing them
        #[arg(long)]
        start: bool,
    },

    /// Print unit files without writing anything
    Render {
        #[command(flatten)]
        input: DeployInput,

        /// Only render this role
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Enable installed units
    Enable {
        #[command(flatten)]
        target: UnitTarget,
    },

    /// Start installed units
    Start {
        #[command(flatten)]
        target: UnitTarget,
    },

    /// Show installed/enabled/active state of the project's units
    Status {
        /// Project directory (default: cwd)
        #[arg(value_hint = ValueHint::DirPath)]
        project_dir: Option<PathBuf>,
    },

    /// Restore the previous version of each unit file and reload systemd
    Rollback {
        /// Project directory (default: cwd)
        #[arg(value_hint = ValueHint::DirPath)]
        project_dir: Option<PathBuf>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Deployment inputs; omitted values are prompted for.
#[derive(Args, Debug, Clone, Default)]
pub struct DeployInput {
    /// Django project directory (contains manage.py)
    #[arg(value_hint = ValueHint::DirPath)]
    pub project_dir: Option<String>,

    /// Account the services run as
    pub service_user: Option<String>,

    /// Gunicorn worker processes
    #[arg(long)]
    pub workers: Option<String>,

    /// Celery worker concurrency
    #[arg(long)]
    pub concurrency: Option<String>,

    /// Virtualenv path, relative to the project directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub venv: Option<String>,

    /// Environment file, relative to the project directory ("" disables it)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub env_file: Option<String>,

    /// Django package holding settings and asgi.py/wsgi.py (default: detected)
    #[arg(long)]
    pub app_module: Option<String>,

    /// Never prompt; fail on missing input
    #[arg(long)]
    pub non_interactive: bool,
}

/// Units of one project, optionally narrowed to a role.
#[derive(Args, Debug, Clone, Default)]
pub struct UnitTarget {
    /// Project directory (default: cwd)
    #[arg(value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Only act on this role
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Web,
    Worker,
    #[value(alias = "beat")]
    Scheduler,
}

impl From<RoleArg> for ServiceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Web => ServiceRole::Web,
            RoleArg::Worker => ServiceRole::Worker,
            RoleArg::Scheduler => ServiceRole::Scheduler,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show {
        /// Project directory whose local config is merged (default: cwd)
        #[arg(value_hint = ValueHint::DirPath)]
        project_dir: Option<PathBuf>,
    },

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
