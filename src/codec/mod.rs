//! Codec Module
//!
//! Bidirectional mapping between model instances and native entities.
//!
//! ## Responsibilities
//! - Derive keys for a model (`kind`, optional id, connection namespace)
//! - Encode every declared field into exactly one native property
//! - Decode stored entities back, rejecting kind mismatches and missing
//!   required properties instead of substituting values
//!
//! ## Field Mapping
//! ```text
//! Text        -> Text             Binary       -> Blob
//! Integer     -> Integer          ForeignKey   -> Key (reference, never a copy)
//! Float       -> Float (f64)      List<T>      -> Array (order kept)
//! Boolean     -> Boolean          Set<T>       -> Array (sorted, distinct)
//! DateTime    -> Timestamp (microsecond precision)
//! Embedded    -> Embedded (nested maps and lists, values untyped)
//! ```
//!
//! Floats persist as 64-bit doubles; values needing more precision than
//! that are rounded on the way in. Date-times lose anything finer than a
//! microsecond.

mod fields;

use crate::entity::{Entity, Id, Key, Value};
use crate::error::{AdapterError, Result};
use crate::model::{FieldDef, FieldValue, ModelInstance, ModelMeta};

/// Encodes and decodes model instances within one namespace
#[derive(Debug, Clone, Default)]
pub struct EntityCodec {
    namespace: String,
}

impl EntityCodec {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for a model row; partial when no id is given
    pub fn derive_key(&self, model: &ModelMeta, id: Option<Id>) -> Key {
        let key = match id {
            Some(id) => Key::new(model.kind(), id),
            None => Key::partial(model.kind()),
        };
        key.with_namespace(self.namespace.clone())
    }

    /// Key of a referenced entity
    pub fn reference_key(&self, target: &str, id: Id) -> Key {
        Key::new(target, id).with_namespace(self.namespace.clone())
    }

    /// Encode an instance into an entity
    pub fn encode(&self, model: &ModelMeta, instance: &ModelInstance) -> Result<Entity> {
        if instance.kind() != model.kind() {
            return Err(AdapterError::Codec(format!(
                "instance of {} cannot be encoded as {}",
                instance.kind(),
                model.kind()
            )));
        }

        if let Some(unknown) = instance
            .values()
            .keys()
            .find(|name| model.get_field(name).is_none())
        {
            return Err(AdapterError::Codec(format!(
                "{} has no field named {}",
                model.kind(),
                unknown
            )));
        }

        let mut entity = Entity::new(self.derive_key(model, instance.pk().cloned()));
        for field in model.fields() {
            let value = match instance.get(&field.name) {
                Some(value) => value.clone(),
                None => field.fallback_value().ok_or_else(|| {
                    AdapterError::Codec(format!(
                        "{}.{} is required and has no default",
                        model.kind(),
                        field.name
                    ))
                })?,
            };
            entity.set(field.column.clone(), self.encode_field(field, &value)?);
        }

        Ok(entity)
    }

    /// Encode a single field value into its native property.
    ///
    /// NULL on a non-nullable field stores the field's default instead.
    pub fn encode_field(&self, field: &FieldDef, value: &FieldValue) -> Result<Value> {
        if !value.is_null() {
            return fields::encode_value(self, field, value);
        }
        if field.nullable {
            return Ok(Value::Null);
        }
        match &field.default {
            Some(default) if !default.is_null() => fields::encode_value(self, field, default),
            _ => Err(AdapterError::Codec(format!(
                "{} is not nullable",
                field.name
            ))),
        }
    }

    /// Encode a filter operand for `field`.
    ///
    /// NULL is always accepted, and repeated fields take a single element.
    pub fn encode_operand(&self, field: &FieldDef, value: &FieldValue) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if field.field_type.is_repeated() && !matches!(value, FieldValue::List(_)) {
            return fields::encode_scalar(self, field.field_type.element_type(), value, &field.name);
        }
        fields::encode_value(self, field, value)
    }

    /// Encode a primary-key filter operand into a key value
    pub fn encode_pk_operand(&self, model: &ModelMeta, value: &FieldValue) -> Result<Value> {
        let id = match value {
            FieldValue::Integer(id) => Id::Int(*id),
            FieldValue::Text(name) => Id::Name(name.clone()),
            FieldValue::ForeignKey(id) => id.clone(),
            FieldValue::Null => return Ok(Value::Null),
            other => {
                return Err(AdapterError::Codec(format!(
                    "{} cannot be used as a primary key value",
                    other
                )))
            }
        };
        Ok(Value::Key(self.derive_key(model, Some(id))))
    }

    /// Decode an entity into an instance of `model`
    pub fn decode(&self, model: &ModelMeta, entity: &Entity) -> Result<ModelInstance> {
        let mut instance = self.decode_header(model, entity)?;

        for field in model.fields() {
            let value = match entity.get(&field.column) {
                Some(stored) => fields::decode_value(field, stored)?,
                None => field.fallback_value().ok_or_else(|| {
                    AdapterError::Codec(format!(
                        "{} entity {} is missing required property {}",
                        model.kind(),
                        entity.key(),
                        field.column
                    ))
                })?,
            };
            instance.set(field.name.clone(), value);
        }

        Ok(instance)
    }

    /// Decode only the properties present on the entity (projections and
    /// keys-only results).
    pub fn decode_partial(&self, model: &ModelMeta, entity: &Entity) -> Result<ModelInstance> {
        let mut instance = self.decode_header(model, entity)?;
        for field in model.fields() {
            if let Some(stored) = entity.get(&field.column) {
                instance.set(field.name.clone(), fields::decode_value(field, stored)?);
            }
        }
        Ok(instance)
    }

    fn decode_header(&self, model: &ModelMeta, entity: &Entity) -> Result<ModelInstance> {
        if entity.kind() != model.kind() {
            return Err(AdapterError::Codec(format!(
                "expected entity of kind {}, found {}",
                model.kind(),
                entity.kind()
            )));
        }
        let pk = entity.key().id().cloned().ok_or_else(|| {
            AdapterError::Codec(format!("stored entity has a partial key: {}", entity.key()))
        })?;
        Ok(ModelInstance::new(model.kind()).with_pk(pk))
    }
}
