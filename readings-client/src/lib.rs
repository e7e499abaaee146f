//! Domain types and Postgres access for imported D0010 meter readings.

pub mod db;
pub mod domain;
