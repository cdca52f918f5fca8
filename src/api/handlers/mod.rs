mod core;
mod transfers;

pub(crate) use core::{events, health, status};
pub(crate) use transfers::{completed_delete, transfers_control, transfers_create};
