//! Wire codecs for propagated values.
//!
//! A [`Codec`] converts one value type to and from the text carried in a header or
//! metadata field. Every codec must satisfy the round-trip law:
//! `parse(render(v)) == v` for each value `parse` can produce.
use std::{fmt, marker::PhantomData, num::ParseIntError, str::FromStr, sync::Arc};

use time::{
    OffsetDateTime, UtcOffset,
    format_description::{OwnedFormatItem, well_known::Rfc3339},
};

use crate::error::{ConfigError, ParseError, RenderError};

/// Textual format shared by every timestamp-typed entry, the deadline included.
///
/// - `Rfc3339` (default): RFC 3339 with as many fractional digits as needed,
///   so nanosecond values survive a round trip exactly.
/// - `Custom`: a `time` format description (version 2 syntax). It must carry an
///   offset component; [`TimeFormat::custom`] rejects descriptions that cannot
///   parse their own output.
#[derive(Debug, Clone, Default)]
pub enum TimeFormat {
    #[default]
    Rfc3339,
    Custom {
        description: String,
        items: Arc<OwnedFormatItem>,
    },
}

impl TimeFormat {
    /// Build a custom format from a `time` format description.
    ///
    /// # Examples
    /// ```
    /// use netctx_core::TimeFormat;
    ///
    /// let fmt = TimeFormat::custom(
    ///     "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
    /// )
    /// .unwrap();
    /// assert!(fmt.to_string().starts_with("[year]"));
    /// ```
    pub fn custom(description: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTimeFormat {
            format: description.to_string(),
            reason,
        };

        let items = time::format_description::parse_owned::<2>(description)
            .map_err(|e| invalid(e.to_string()))?;

        let probe = OffsetDateTime::UNIX_EPOCH
            .format(&items)
            .map_err(|e| invalid(e.to_string()))?;
        OffsetDateTime::parse(&probe, &items).map_err(|e| invalid(e.to_string()))?;

        Ok(Self::Custom {
            description: description.to_string(),
            items: Arc::new(items),
        })
    }

    /// Render `at` as wire text.
    ///
    /// RFC 3339 keeps the offset of `at` when it can be expressed (hours and minutes
    /// only); other offsets are converted to UTC first, which names the same instant.
    ///
    /// # Examples
    /// ```
    /// use netctx_core::TimeFormat;
    /// use time::macros::datetime;
    ///
    /// let at = datetime!(2024-03-01 12:00:00 UTC);
    /// assert_eq!(TimeFormat::Rfc3339.format(at).unwrap(), "2024-03-01T12:00:00Z");
    /// ```
    pub fn format(&self, at: OffsetDateTime) -> Result<String, RenderError> {
        let out = match self {
            // RFC 3339 cannot express offsets with a seconds component.
            Self::Rfc3339 => at
                .format(&Rfc3339)
                .or_else(|_| at.to_offset(UtcOffset::UTC).format(&Rfc3339)),
            Self::Custom { items, .. } => at.format(&**items),
        };
        out.map_err(|e| RenderError(e.to_string()))
    }

    /// Parse wire text produced by [`TimeFormat::format`] (or any peer using the same format).
    ///
    /// # Errors
    /// [`ParseError::Time`] carrying the offending text. The harvester reports it through
    /// the registry logger and drops the field.
    ///
    /// # Examples
    /// ```
    /// use netctx_core::TimeFormat;
    /// use time::macros::datetime;
    ///
    /// let at = TimeFormat::Rfc3339.parse("2024-03-01T14:00:00+02:00").unwrap();
    /// assert_eq!(at, datetime!(2024-03-01 12:00:00 UTC));
    /// assert!(TimeFormat::Rfc3339.parse("tomorrow").is_err());
    /// ```
    pub fn parse(&self, text: &str) -> Result<OffsetDateTime, ParseError> {
        let parsed = match self {
            Self::Rfc3339 => OffsetDateTime::parse(text, &Rfc3339),
            Self::Custom { items, .. } => OffsetDateTime::parse(text, &**items),
        };
        parsed.map_err(|source| ParseError::Time {
            text: text.to_string(),
            source,
        })
    }
}

impl FromStr for TimeFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "rfc3339" | "rfc3339nano" => Ok(Self::Rfc3339),
            _ => Self::custom(s),
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rfc3339 => f.write_str("rfc3339"),
            Self::Custom { description, .. } => f.write_str(description),
        }
    }
}

/// Process-wide formatting settings handed to every codec call.
#[derive(Debug, Clone, Default)]
pub struct WireFormat {
    pub time: TimeFormat,
}

/// Converts one value type to and from wire text.
pub trait Codec<T>: Send + Sync + 'static {
    fn parse(&self, text: &str, wire: &WireFormat) -> Result<T, ParseError>;

    fn render(&self, value: &T, wire: &WireFormat) -> Result<String, RenderError>;
}

/// Plain text, carried verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec<String> for TextCodec {
    fn parse(&self, text: &str, _: &WireFormat) -> Result<String, ParseError> {
        Ok(text.to_string())
    }

    fn render(&self, value: &String, _: &WireFormat) -> Result<String, RenderError> {
        Ok(value.clone())
    }
}

/// Decimal integer of a fixed width. Overflow and non-numeric text are rejected.
pub struct IntCodec<T>(PhantomData<fn() -> T>);

impl<T> IntCodec<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for IntCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for IntCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> Codec<T> for IntCodec<T>
where
    T: FromStr<Err = ParseIntError> + fmt::Display + Send + Sync + 'static,
{
    fn parse(&self, text: &str, _: &WireFormat) -> Result<T, ParseError> {
        text.parse::<T>().map_err(|source| ParseError::Int {
            text: text.to_string(),
            source,
        })
    }

    fn render(&self, value: &T, _: &WireFormat) -> Result<String, RenderError> {
        Ok(value.to_string())
    }
}

/// Absolute timestamp in the configured [`TimeFormat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampCodec;

impl Codec<OffsetDateTime> for TimestampCodec {
    fn parse(&self, text: &str, wire: &WireFormat) -> Result<OffsetDateTime, ParseError> {
        wire.time.parse(text)
    }

    fn render(&self, value: &OffsetDateTime, wire: &WireFormat) -> Result<String, RenderError> {
        wire.time.format(*value)
    }
}

pub(crate) type ParseFn<T> = Arc<dyn Fn(&str) -> Result<T, ParseError> + Send + Sync>;
pub(crate) type RenderFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Codec assembled from user closures. Without a render closure the value's
/// `Display` output is sent.
pub struct FnCodec<T> {
    parse: ParseFn<T>,
    render: Option<RenderFn<T>>,
}

impl<T> FnCodec<T> {
    pub(crate) fn new(parse: ParseFn<T>, render: Option<RenderFn<T>>) -> Self {
        Self { parse, render }
    }
}

impl<T> Codec<T> for FnCodec<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn parse(&self, text: &str, _: &WireFormat) -> Result<T, ParseError> {
        (self.parse)(text)
    }

    fn render(&self, value: &T, _: &WireFormat) -> Result<String, RenderError> {
        Ok(match &self.render {
            Some(render) => render(value),
            None => value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn wire() -> WireFormat {
        WireFormat::default()
    }

    fn roundtrip<T, C: Codec<T>>(codec: &C, value: &T, wire: &WireFormat) -> T {
        let text = codec.render(value, wire).expect("render must succeed");
        codec.parse(&text, wire).expect("rendered text must parse")
    }

    #[test]
    fn text_is_carried_verbatim() {
        for s in ["", "plain", "with spaces", "ünïcödé"] {
            assert_eq!(roundtrip(&TextCodec, &s.to_string(), &wire()), s);
        }
    }

    #[test]
    fn int32_roundtrips_boundaries() {
        let codec = IntCodec::<i32>::new();
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(roundtrip(&codec, &v, &wire()), v);
        }
    }

    #[test]
    fn int32_rejects_overflow_and_garbage() {
        let codec = IntCodec::<i32>::new();
        let bad = ["2147483648", "-2147483649", "abc", "1.5", "", " 1", "0x10"];

        for text in bad {
            let res = codec.parse(text, &wire());
            assert!(
                matches!(res, Err(ParseError::Int { .. })),
                "expected Int error for {text:?}, got {res:?}"
            );
        }
    }

    #[test]
    fn int64_keeps_full_width() {
        let codec = IntCodec::<i64>::new();
        let wide = i64::from(i32::MAX) + 1;

        assert_eq!(roundtrip(&codec, &wide, &wire()), wide);
        assert_eq!(roundtrip(&codec, &i64::MIN, &wire()), i64::MIN);
        assert_eq!(roundtrip(&codec, &i64::MAX, &wire()), i64::MAX);
        assert!(codec.parse("9223372036854775808", &wire()).is_err());
    }

    #[test]
    fn timestamp_roundtrips_with_nanoseconds() {
        let at = datetime!(2024-02-29 23:59:59.123456789 UTC);
        let text = TimestampCodec.render(&at, &wire()).unwrap();

        assert_eq!(text, "2024-02-29T23:59:59.123456789Z");
        assert_eq!(TimestampCodec.parse(&text, &wire()).unwrap(), at);
    }

    #[test]
    fn timestamp_keeps_offset_instant() {
        let at = datetime!(2024-06-01 10:00:00.5 +02:00);
        assert_eq!(roundtrip(&TimestampCodec, &at, &wire()), at);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        let res = TimestampCodec.parse("yesterday", &wire());
        assert!(matches!(res, Err(ParseError::Time { .. })));
    }

    #[test]
    fn custom_time_format_roundtrips_at_its_precision() {
        let fmt: TimeFormat = "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
            .parse()
            .unwrap();
        let wire = WireFormat { time: fmt };

        let at = datetime!(2030-01-02 03:04:05 UTC);
        let text = TimestampCodec.render(&at, &wire).unwrap();

        assert_eq!(text, "2030-01-02 03:04:05 +00:00");
        assert_eq!(TimestampCodec.parse(&text, &wire).unwrap(), at);
    }

    #[test]
    fn custom_time_format_without_offset_is_rejected() {
        let res = TimeFormat::custom("[year]-[month]-[day]");
        assert!(matches!(res, Err(ConfigError::InvalidTimeFormat { .. })));
    }

    #[test]
    fn time_format_names_parse_case_insensitive() {
        for name in ["rfc3339", "RFC3339", "RFC3339Nano"] {
            let fmt: TimeFormat = name.parse().unwrap();
            assert!(matches!(fmt, TimeFormat::Rfc3339), "{name}");
        }
    }

    #[test]
    fn fn_codec_falls_back_to_display() {
        let codec = FnCodec::<u8>::new(
            Arc::new(|s: &str| s.parse::<u8>().map_err(|e| ParseError::invalid(s, e.to_string()))),
            None,
        );

        assert_eq!(codec.render(&7, &wire()).unwrap(), "7");
        assert_eq!(codec.parse("7", &wire()).unwrap(), 7);
        assert!(matches!(
            codec.parse("300", &wire()),
            Err(ParseError::Invalid { .. })
        ));
    }
}
