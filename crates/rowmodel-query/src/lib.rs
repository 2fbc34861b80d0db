//! SQL dataset layer for rowmodel.
//!
//! `rowmodel-query` is the **query construction layer**. Records never
//! write SQL themselves: they build an [`Expr`] filter for their primary
//! key, narrow a [`Dataset`] with it and ask the dataset to insert,
//! update, delete or fetch. Statements execute through the `Connection`
//! held by the dataset's `Database` handle.

pub mod dataset;
pub mod expr;

pub use dataset::{Dataset, ValueMap};
pub use expr::{BinaryOp, Expr, literal};
