//! Model Module
//!
//! ORM-side schema: the declared fields of a model and the values of one
//! instance. The store has no schema of its own; this is what the codec
//! enforces on every read and write.

mod field;
mod instance;

pub use field::{FieldDef, FieldType, FieldValue};
pub use instance::ModelInstance;

use crate::error::{AdapterError, Result};

/// Declared shape of a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    kind: String,
    pk_column: String,
    fields: Vec<FieldDef>,
    unique_together: Vec<Vec<String>>,
    enforce_constraint_checks: Option<bool>,
}

impl ModelMeta {
    /// New model stored under `kind`, primary key column `id`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            pk_column: "id".to_string(),
            fields: Vec::new(),
            unique_together: Vec::new(),
            enforce_constraint_checks: None,
        }
    }

    pub fn pk_column(mut self, column: impl Into<String>) -> Self {
        self.pk_column = column.into();
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a multi-field uniqueness constraint
    pub fn unique_together(mut self, fields: &[&str]) -> Self {
        self.unique_together
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Model-level override of the global constraint-check flag
    pub fn enforce_constraint_checks(mut self, enabled: bool) -> Self {
        self.enforce_constraint_checks = Some(enabled);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn pk(&self) -> &str {
        &self.pk_column
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether markers should be maintained for this model
    pub fn constraints_enabled(&self, global: bool) -> bool {
        self.enforce_constraint_checks.unwrap_or(global) && self.has_unique_constraints()
    }

    pub fn has_unique_constraints(&self) -> bool {
        !self.unique_together.is_empty() || self.fields.iter().any(|f| f.unique)
    }

    /// Every uniqueness constraint as a list of fields, each list sorted by
    /// field name so derived marker identifiers are stable.
    ///
    /// Fails if a `unique_together` group names a field the model lacks.
    pub fn unique_combinations(&self) -> Result<Vec<Vec<&FieldDef>>> {
        let mut combinations = Vec::with_capacity(self.unique_together.len());
        for names in &self.unique_together {
            let fields = names
                .iter()
                .map(|name| {
                    self.get_field(name).ok_or_else(|| {
                        AdapterError::Config(format!(
                            "unique_together on {} names unknown field {}",
                            self.kind, name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            combinations.push(fields);
        }

        combinations.extend(self.fields.iter().filter(|f| f.unique).map(|f| vec![f]));

        for combination in &mut combinations {
            combination.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(combinations)
    }
}
