//! Relational persistence (SeaORM)

pub mod entities;
pub mod migration;
pub mod seaorm_db;

pub use seaorm_db::{DatabaseBackendType, SeaOrmDatabase};
