//! unitsmith: systemd units for Django web, Celery worker and Celery beat
//!
//! Layers, innermost first: `domain` (entities, rendering, errors),
//! `application` (services over I/O traits), `infrastructure` (real I/O
//! and wiring), `cli` (argument parsing and output).

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
