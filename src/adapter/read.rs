//! Fetch, select and aggregates

use crate::connection::Connection;
use crate::entity::{Id, Key, Value};
use crate::error::{AdapterError, Result};
use crate::model::{FieldValue, ModelInstance, ModelMeta};
use crate::query::{Aggregate, QueryPlan, QuerySpec, Rows};

impl Connection {
    /// Fetch rows by primary key, aligned with `ids`
    pub fn fetch(&mut self, model: &ModelMeta, ids: &[Id]) -> Result<Vec<Option<ModelInstance>>> {
        let keys: Vec<Key> = ids
            .iter()
            .map(|id| self.codec().derive_key(model, Some(id.clone())))
            .collect();
        self.get(&keys)?
            .into_iter()
            .map(|entity| {
                entity
                    .map(|entity| self.codec().decode(model, &entity))
                    .transpose()
            })
            .collect()
    }

    /// Lazy row sequence for `spec`
    pub fn select(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<Rows> {
        self.query(model, spec)
    }

    /// The plan `spec` would run with, including any client-side fallbacks
    pub fn explain(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<QueryPlan> {
        self.translate(model, spec)
    }

    pub fn count(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<usize> {
        let mut rows = self.query(model, &spec.clone().aggregate(Aggregate::Count))?;
        let mut count = 0;
        while let Some(entity) = rows.next_entity() {
            entity?;
            count += 1;
        }
        Ok(count)
    }

    /// Compute `aggregate` over the rows matching `spec`. Aggregates over
    /// no non-NULL values yield NULL.
    pub fn aggregate(
        &self,
        model: &ModelMeta,
        spec: &QuerySpec,
        aggregate: Aggregate,
    ) -> Result<FieldValue> {
        let field_name = match aggregate.field() {
            None => {
                let count = self.count(model, spec)?;
                return Ok(FieldValue::Integer(count as i64));
            }
            Some(field) => field.to_string(),
        };
        let field = model.get_field(&field_name).ok_or_else(|| {
            AdapterError::Codec(format!("{} has no field named {}", model.kind(), field_name))
        })?;

        let rows = self.query(model, &spec.clone().aggregate(aggregate.clone()))?;
        let mut values = Vec::new();
        for row in rows {
            match row?.get(&field_name) {
                Some(value) if !value.is_null() => values.push(value.clone()),
                _ => {}
            }
        }
        if values.is_empty() {
            return Ok(FieldValue::Null);
        }

        match aggregate {
            Aggregate::Count => Ok(FieldValue::Integer(values.len() as i64)),
            Aggregate::Sum(_) => sum(&field_name, &values),
            Aggregate::Avg(_) => {
                let total = as_float(&sum(&field_name, &values)?);
                Ok(FieldValue::Float(total / values.len() as f64))
            }
            Aggregate::Min(_) | Aggregate::Max(_) => {
                let mut ranked = Vec::with_capacity(values.len());
                for value in values {
                    ranked.push((self.codec().encode_operand(field, &value)?, value));
                }
                let ordering = |a: &(Value, FieldValue), b: &(Value, FieldValue)| a.0.compare(&b.0);
                let picked = if matches!(aggregate, Aggregate::Min(_)) {
                    ranked.into_iter().min_by(ordering)
                } else {
                    ranked.into_iter().max_by(ordering)
                };
                Ok(picked.map_or(FieldValue::Null, |(_, value)| value))
            }
        }
    }
}

fn sum(field: &str, values: &[FieldValue]) -> Result<FieldValue> {
    let mut integer: Option<i64> = Some(0);
    let mut float = 0.0;
    for value in values {
        match value {
            FieldValue::Integer(int) => {
                integer = integer.and_then(|total| total.checked_add(*int));
                float += *int as f64;
            }
            FieldValue::Float(value) => {
                integer = None;
                float += value;
            }
            other => {
                return Err(AdapterError::NotSupported(format!(
                    "cannot sum {} value {}",
                    field, other
                )))
            }
        }
    }
    Ok(match integer {
        Some(total) => FieldValue::Integer(total),
        None => FieldValue::Float(float),
    })
}

fn as_float(value: &FieldValue) -> f64 {
    match value {
        FieldValue::Integer(int) => *int as f64,
        FieldValue::Float(float) => *float,
        _ => f64::NAN,
    }
}
