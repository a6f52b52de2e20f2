//! Columnar data frames exchanged between services and callers.
//!
//! A [`Frame`] is a named collection of equally sized [`Field`]s. Frames are
//! built with [`Frame::with_field`] and validated with [`Frame::check`] before
//! they leave a service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::FrameError;
use crate::live::LiveChannelAddress;

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Typed column storage for a [`Field`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum FieldValues {
    Time(Vec<DateTime<Utc>>),
    UInt32(Vec<u32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::UInt32(v) => v.len(),
            FieldValues::Float64(v) => v.len(),
            FieldValues::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValues::Time(_) => "time",
            FieldValues::UInt32(_) => "uint32",
            FieldValues::Float64(_) => "float64",
            FieldValues::Utf8(_) => "utf8",
        }
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// One named column of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub values: FieldValues,
}

impl Field {
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the stored values. The new values must have the same type.
    pub fn set_values(&mut self, values: FieldValues) -> Result<(), FrameError> {
        if std::mem::discriminant(&self.values) != std::mem::discriminant(&values) {
            return Err(FrameError::TypeMismatch {
                field: self.name.clone(),
                expected: self.values.type_name(),
                actual: values.type_name(),
            });
        }
        self.values = values;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Metadata attached to a frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Live channel the client can subscribe to for updates of this frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            meta: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    /// Number of rows, taken from the first field.
    pub fn row_len(&self) -> usize {
        self.fields.first().map(Field::len).unwrap_or(0)
    }

    /// Point clients at the live channel carrying updates for this frame.
    pub fn set_channel(&mut self, channel: &LiveChannelAddress) {
        self.meta.get_or_insert_with(FrameMeta::default).channel = Some(channel.to_string());
    }

    pub fn channel(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.channel.as_deref())
    }

    /// Validate the frame: unique field names, all fields the same length.
    pub fn check(self) -> Result<Self, FrameError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FrameError::DuplicateField(field.name.clone()));
            }
        }
        let expected = self.row_len();
        if let Some(bad) = self.fields.iter().find(|f| f.len() != expected) {
            return Err(FrameError::LengthMismatch {
                field: bad.name.clone(),
                expected,
                actual: bad.len(),
            });
        }
        Ok(self)
    }
}
