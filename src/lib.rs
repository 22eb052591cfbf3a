#![allow(async_fn_in_trait)]

pub mod commands;
pub mod config;
pub mod constructor;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod keyboard;
pub mod menu;
pub mod messenger;
pub mod registration;
pub mod runner;
pub mod schema;
pub mod session;
pub mod state;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
