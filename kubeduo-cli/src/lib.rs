//! Command-line front end for kubeduo

pub mod commands;
pub mod logging;
pub mod prereq;
pub mod report;
