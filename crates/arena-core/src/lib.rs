//! Objective engine, decision validation, agent sessions, and the tick loop
//! for Agent Arena.
//!
//! This crate owns the per-tick exchange that drives an episode: build an
//! observation per agent, wait a bounded time for each decision, validate
//! it against the agent's capabilities, apply it through the scenario, and
//! score progress against the objective.
//!
//! # Modules
//!
//! - [`agent`] -- The [`Agent`] trait and optional episode hooks.
//! - [`clock`] -- Monotonic tick counter.
//! - [`config`] -- Configuration loading from `arena-config.yaml` into
//!   strongly-typed structs.
//! - [`objective`] -- Progress extraction, per-metric scoring, pass/fail.
//! - [`operator`] -- Stop control, tick pacing, and the tick cap.
//! - [`runner`] -- The episode loop, registration queue, and final report.
//! - [`scenario`] -- The [`ScenarioController`] trait a world implements.
//! - [`session`] -- Agent sessions and their state machine.
//! - [`tick`] -- The four-phase tick cycle.
//! - [`tools`] -- Tool trait and name-keyed dispatch.
//! - [`transport`] -- Per-session channels and the bounded exchange.
//! - [`validation`] -- Capability, parameter, and bounds checks.
//!
//! [`Agent`]: agent::Agent
//! [`ScenarioController`]: scenario::ScenarioController

pub mod agent;
pub mod clock;
pub mod config;
pub mod objective;
pub mod operator;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod tick;
pub mod tools;
pub mod transport;
pub mod validation;
