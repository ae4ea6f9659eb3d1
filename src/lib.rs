//! BRT Simulation Library
//!
//! A bus rapid transit corridor simulation comparing a dedicated bus lane
//! against mixed traffic. It runs headless; any renderer can sit on top.

pub mod simulation;
