//! Registered entries: a [`Key`], a wire name and a type-erased codec.
use std::{
    any::{Any, TypeId, type_name},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    codec::{Codec, FnCodec, ParseFn, RenderFn, WireFormat},
    error::{ConfigError, EntryError, ParseError},
    key::{Key, KeyId},
};

/// Bounds every propagated value type satisfies.
///
/// `Display` backs the default "stringify" render used when a custom entry
/// registers no render function.
pub trait EntryValue: fmt::Display + Send + Sync + 'static {}

impl<T> EntryValue for T where T: fmt::Display + Send + Sync + 'static {}

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

trait ErasedCodec: Send + Sync {
    fn parse_any(&self, text: &str, wire: &WireFormat) -> Result<AnyValue, ParseError>;

    /// Returns `None` when `value` is not of the codec's type.
    fn render_any(
        &self,
        value: &(dyn Any + Send + Sync),
        wire: &WireFormat,
    ) -> Option<Result<String, String>>;

    fn value_type(&self) -> (TypeId, &'static str);
}

struct Typed<T, C> {
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> ErasedCodec for Typed<T, C>
where
    T: EntryValue,
    C: Codec<T>,
{
    fn parse_any(&self, text: &str, wire: &WireFormat) -> Result<AnyValue, ParseError> {
        let value = self.codec.parse(text, wire)?;
        Ok(Arc::new(value))
    }

    fn render_any(
        &self,
        value: &(dyn Any + Send + Sync),
        wire: &WireFormat,
    ) -> Option<Result<String, String>> {
        let value = value.downcast_ref::<T>()?;
        Some(self.codec.render(value, wire).map_err(|e| e.0))
    }

    fn value_type(&self) -> (TypeId, &'static str) {
        (TypeId::of::<T>(), type_name::<T>())
    }
}

/// One propagated value: identity, wire name and codec.
///
/// Cheap to clone; the codec is shared.
#[derive(Clone)]
pub struct Entry {
    key: KeyId,
    name: Arc<str>,
    codec: Arc<dyn ErasedCodec>,
}

impl Entry {
    /// Create an entry from a key, a wire name and a codec for the key's value type.
    pub fn new<T, C>(key: &Key<T>, name: impl Into<String>, codec: C) -> Self
    where
        T: EntryValue,
        C: Codec<T>,
    {
        Self {
            key: key.id(),
            name: Arc::from(name.into()),
            codec: Arc::new(Typed {
                codec,
                _marker: PhantomData,
            }),
        }
    }

    /// Start building an entry from plain closures.
    pub fn builder<T: EntryValue>(key: &Key<T>, name: impl Into<String>) -> EntryBuilder<T> {
        EntryBuilder {
            key: *key,
            name: name.into(),
            parse: None,
            render: None,
        }
    }

    #[inline]
    pub fn key(&self) -> KeyId {
        self.key
    }

    /// Name appended to the transport prefix to form the wire field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the value type this entry produces.
    pub fn value_type_name(&self) -> &'static str {
        self.codec.value_type().1
    }

    /// Parse `text` into a value of type `T`.
    ///
    /// Fails with [`EntryError::TypeMismatch`] when `T` is not the entry's value type.
    pub fn unmarshal<T>(&self, text: &str, wire: &WireFormat) -> Result<T, EntryError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (expected_id, expected) = self.codec.value_type();
        if expected_id != TypeId::of::<T>() {
            return Err(EntryError::TypeMismatch {
                entry: self.name.to_string(),
                expected,
                actual: type_name::<T>(),
            });
        }

        let value = self.parse_value(text, wire)?;
        let value = value
            .downcast::<T>()
            .map_err(|_| EntryError::TypeMismatch {
                entry: self.name.to_string(),
                expected,
                actual: type_name::<T>(),
            })?;
        Ok(Arc::unwrap_or_clone(value))
    }

    /// Render `value` to wire text.
    pub fn marshal<T>(&self, value: &T, wire: &WireFormat) -> Result<String, EntryError>
    where
        T: Send + Sync + 'static,
    {
        self.render_dyn(value, wire)
    }

    pub(crate) fn parse_value(&self, text: &str, wire: &WireFormat) -> Result<AnyValue, EntryError> {
        self.codec
            .parse_any(text, wire)
            .map_err(|source| EntryError::Parse {
                entry: self.name.to_string(),
                source,
            })
    }

    pub(crate) fn render_value(&self, value: &AnyValue, wire: &WireFormat) -> Result<String, EntryError> {
        self.render_dyn(&**value, wire)
    }

    fn render_dyn(
        &self,
        value: &(dyn Any + Send + Sync),
        wire: &WireFormat,
    ) -> Result<String, EntryError> {
        match self.codec.render_any(value, wire) {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(EntryError::Render {
                entry: self.name.to_string(),
                reason,
            }),
            None => Err(EntryError::TypeMismatch {
                entry: self.name.to_string(),
                expected: self.codec.value_type().1,
                actual: "<foreign value>",
            }),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("name", &&*self.name)
            .field("type", &self.value_type_name())
            .finish()
    }
}

/// Builder for entries made of closures. `parse` is mandatory.
pub struct EntryBuilder<T> {
    key: Key<T>,
    name: String,
    parse: Option<ParseFn<T>>,
    render: Option<RenderFn<T>>,
}

impl<T: EntryValue> EntryBuilder<T> {
    pub fn parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T, ParseError> + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(parse));
        self
    }

    /// Override the default `Display`-based render.
    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    /// Finish the entry. A missing parse function is a configuration error.
    pub fn build(self) -> Result<Entry, ConfigError> {
        let parse = self.parse.ok_or_else(|| ConfigError::MissingParse(self.name.clone()))?;
        Ok(Entry::new(&self.key, self.name, FnCodec::new(parse, self.render)))
    }
}
