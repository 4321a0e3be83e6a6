//! Fixed-layout binary record decoding.
//!
//! A layout is a static list of [`FieldDescriptor`]s (offset, numeric kind,
//! element count). [`BinaryTelemetryDecoder`] validates a buffer against the
//! layout once, after which every field read on the resulting
//! [`DecodedRecord`] is a bounds-checked little-endian load.

use crate::error::DecodeError;

/// Primitive encoding of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    F32,
    I32,
    U32,
    /// Fixed-width character array, NUL padded. Display-only.
    Chars(usize),
}

impl NumericKind {
    /// Width of one element in bytes.
    pub const fn width(&self) -> usize {
        match self {
            NumericKind::F32 | NumericKind::I32 | NumericKind::U32 => 4,
            NumericKind::Chars(len) => *len,
        }
    }
}

/// Named location of a field inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub kind: NumericKind,
    /// Number of consecutive elements (1 for scalars).
    pub count: usize,
}

impl FieldDescriptor {
    pub const fn f32(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            kind: NumericKind::F32,
            count: 1,
        }
    }

    pub const fn i32(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            kind: NumericKind::I32,
            count: 1,
        }
    }

    pub const fn u32(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            kind: NumericKind::U32,
            count: 1,
        }
    }

    pub const fn chars(name: &'static str, offset: usize, len: usize) -> Self {
        Self {
            name,
            offset,
            kind: NumericKind::Chars(len),
            count: 1,
        }
    }

    /// Turn a scalar descriptor into an array of `count` elements.
    #[must_use]
    pub const fn array(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// One past the last byte covered by this field.
    pub const fn end(&self) -> usize {
        self.offset
            .saturating_add(self.kind.width().saturating_mul(self.count))
    }

    fn element_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        if index >= self.count {
            return None;
        }
        let width = self.kind.width();
        let start = self.offset.checked_add(width.checked_mul(index)?)?;
        Some(start..start.checked_add(width)?)
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Chars(String),
}

/// Validates buffers against one source layout.
#[derive(Debug, Clone)]
pub struct BinaryTelemetryDecoder {
    name: &'static str,
    fields: &'static [FieldDescriptor],
    discriminator: Option<FieldDescriptor>,
    required_len: usize,
}

impl BinaryTelemetryDecoder {
    /// Build a decoder for `fields`.
    ///
    /// When `discriminator` is set it must be an `I32` field; a non-positive
    /// value there means "no frame published yet".
    pub fn new(
        name: &'static str,
        fields: &'static [FieldDescriptor],
        discriminator: Option<FieldDescriptor>,
    ) -> Self {
        let required_len = fields
            .iter()
            .chain(discriminator.iter())
            .map(FieldDescriptor::end)
            .max()
            .unwrap_or(0);
        Self {
            name,
            fields,
            discriminator,
            required_len,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    /// Minimum buffer length accepted by [`decode`](Self::decode).
    pub fn required_len(&self) -> usize {
        self.required_len
    }

    /// Read only the discriminator, without validating the rest of the layout.
    pub fn peek_discriminator(&self, bytes: &[u8]) -> Option<i32> {
        self.discriminator
            .as_ref()
            .and_then(|field| read_i32_le(bytes, field.offset))
    }

    /// Validate `bytes` and take ownership of them as a record.
    ///
    /// # Errors
    ///
    /// [`DecodeError::BufferTooSmall`] when the buffer does not cover every
    /// field, [`DecodeError::NoValidFrame`] when the discriminator is `<= 0`.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<DecodedRecord, DecodeError> {
        if bytes.len() < self.required_len {
            return Err(DecodeError::BufferTooSmall {
                required: self.required_len,
                actual: bytes.len(),
            });
        }

        let discriminator = self.peek_discriminator(&bytes);
        if let Some(value) = discriminator
            && value <= 0
        {
            return Err(DecodeError::NoValidFrame {
                discriminator: value,
            });
        }

        Ok(DecodedRecord {
            bytes,
            discriminator,
        })
    }

    /// Copying variant of [`decode`](Self::decode) for borrowed views.
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode).
    pub fn decode_slice(&self, bytes: &[u8]) -> Result<DecodedRecord, DecodeError> {
        self.decode(bytes.to_vec())
    }
}

/// A buffer that passed layout validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    bytes: Vec<u8>,
    discriminator: Option<i32>,
}

impl DecodedRecord {
    /// Discriminator value (packet id or equivalent), if the layout has one.
    pub fn discriminator(&self) -> Option<i32> {
        self.discriminator
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Element `index` of `field` as a float. Non-finite values read as `None`.
    pub fn f32_at(&self, field: &FieldDescriptor, index: usize) -> Option<f32> {
        if field.kind != NumericKind::F32 {
            return None;
        }
        let range = field.element_range(index)?;
        read_f32_le(&self.bytes, range.start)
    }

    pub fn f32(&self, field: &FieldDescriptor) -> Option<f32> {
        self.f32_at(field, 0)
    }

    pub fn i32_at(&self, field: &FieldDescriptor, index: usize) -> Option<i32> {
        if field.kind != NumericKind::I32 {
            return None;
        }
        let range = field.element_range(index)?;
        read_i32_le(&self.bytes, range.start)
    }

    pub fn i32(&self, field: &FieldDescriptor) -> Option<i32> {
        self.i32_at(field, 0)
    }

    pub fn u32(&self, field: &FieldDescriptor) -> Option<u32> {
        if field.kind != NumericKind::U32 {
            return None;
        }
        let range = field.element_range(0)?;
        read_u32_le(&self.bytes, range.start)
    }

    /// All elements of a float array, `0.0` for unreadable slots.
    pub fn f32_array<const N: usize>(&self, field: &FieldDescriptor) -> [f32; N] {
        std::array::from_fn(|i| self.f32_at(field, i).unwrap_or(0.0))
    }

    /// Generic accessor returning the first element of any kind.
    pub fn value(&self, field: &FieldDescriptor) -> Option<FieldValue> {
        match field.kind {
            NumericKind::F32 => self.f32(field).map(FieldValue::F32),
            NumericKind::I32 => self.i32(field).map(FieldValue::I32),
            NumericKind::U32 => self.u32(field).map(FieldValue::U32),
            NumericKind::Chars(_) => {
                let range = field.element_range(0)?;
                let raw = self.bytes.get(range)?;
                let text = raw.split(|b| *b == 0).next().unwrap_or(raw);
                Some(FieldValue::Chars(String::from_utf8_lossy(text).into_owned()))
            }
        }
    }
}

pub fn read_f32_le(data: &[u8], offset: usize) -> Option<f32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|b| b.try_into().ok())
        .map(f32::from_le_bytes)
        .filter(|v| v.is_finite())
}

pub fn read_i32_le(data: &[u8], offset: usize) -> Option<i32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_le_bytes)
}

pub fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SEQ: FieldDescriptor = FieldDescriptor::i32("seq", 0);
    const SPEED: FieldDescriptor = FieldDescriptor::f32("speed", 4);
    const WHEELS: FieldDescriptor = FieldDescriptor::f32("wheels", 8).array(4);
    const COUNT: FieldDescriptor = FieldDescriptor::u32("count", 24);
    const LABEL: FieldDescriptor = FieldDescriptor::chars("label", 28, 8);
    const FIELDS: &[FieldDescriptor] = &[SEQ, SPEED, WHEELS, COUNT, LABEL];

    fn decoder() -> BinaryTelemetryDecoder {
        BinaryTelemetryDecoder::new("test", FIELDS, Some(SEQ))
    }

    fn buffer(seq: i32) -> Vec<u8> {
        let mut data = vec![0u8; 36];
        data[0..4].copy_from_slice(&seq.to_le_bytes());
        data[4..8].copy_from_slice(&42.5f32.to_le_bytes());
        for (i, v) in [1.0f32, 2.0, 3.0, 4.0].iter().enumerate() {
            let off = 8 + i * 4;
            data[off..off + 4].copy_from_slice(&v.to_le_bytes());
        }
        data[24..28].copy_from_slice(&7u32.to_le_bytes());
        data[28..31].copy_from_slice(b"abc");
        data
    }

    #[test]
    fn test_required_len_covers_arrays() {
        assert_eq!(WHEELS.end(), 24);
        assert_eq!(decoder().required_len(), 36);
    }

    #[test]
    fn test_decode_valid_record() -> TestResult {
        let record = decoder().decode(buffer(3))?;
        assert_eq!(record.discriminator(), Some(3));
        assert!((record.f32(&SPEED).ok_or("speed")? - 42.5).abs() < f32::EPSILON);
        let wheels: [f32; 4] = record.f32_array(&WHEELS);
        assert!((wheels[3] - 4.0).abs() < f32::EPSILON);
        assert_eq!(record.u32(&COUNT), Some(7));
        assert_eq!(
            record.value(&LABEL),
            Some(FieldValue::Chars("abc".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_decode_too_small() {
        let result = decoder().decode(vec![1, 0, 0, 0]);
        assert_eq!(
            result,
            Err(DecodeError::BufferTooSmall {
                required: 36,
                actual: 4
            })
        );
    }

    #[test]
    fn test_non_positive_discriminator_is_no_frame() {
        for seq in [0, -1, i32::MIN] {
            let result = decoder().decode(buffer(seq));
            assert_eq!(result, Err(DecodeError::NoValidFrame { discriminator: seq }));
        }
    }

    #[test]
    fn test_kind_mismatch_reads_none() -> TestResult {
        let record = decoder().decode(buffer(1))?;
        assert_eq!(record.i32(&SPEED), None);
        assert_eq!(record.f32(&SEQ), None);
        assert_eq!(record.f32_at(&WHEELS, 4), None);
        Ok(())
    }

    #[test]
    fn test_non_finite_float_reads_none() -> TestResult {
        let mut data = buffer(1);
        data[4..8].copy_from_slice(&f32::NAN.to_le_bytes());
        let record = decoder().decode(data)?;
        assert_eq!(record.f32(&SPEED), None);
        Ok(())
    }

    #[test]
    fn test_layout_without_discriminator_accepts_zeroes() -> TestResult {
        let decoder = BinaryTelemetryDecoder::new("plain", FIELDS, None);
        let record = decoder.decode(vec![0u8; 36])?;
        assert_eq!(record.discriminator(), None);
        Ok(())
    }
}
