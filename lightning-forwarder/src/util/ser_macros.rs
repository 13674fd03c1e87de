// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Some macros that implement [`Readable`]/[`Writeable`] traits for lightning-forwarder types.
//! Some of these also implement the same traits for the user's types.
//!
//! Objects are written as a length-prefixed TLV stream. Fields are listed with increasing TLV
//! type and marked either `required` (always written, must be present when read) or `option`
//! (an `Option<T>` field, written only when `Some`). As with BOLT TLV streams, unknown even types
//! fail the read and unknown odd types are skipped, so new optional fields should use odd types.
//!
//! [`Readable`]: crate::util::ser::Readable
//! [`Writeable`]: crate::util::ser::Writeable

#[doc(hidden)]
#[macro_export]
macro_rules! _encode_tlv {
	($stream: expr, $type: expr, $field: expr, required) => {
		$crate::util::ser::Writeable::write(&$crate::util::ser::BigSize($type), $stream)?;
		let field_len = $crate::util::ser::Writeable::serialized_length(&$field);
		$crate::util::ser::Writeable::write(&$crate::util::ser::BigSize(field_len as u64), $stream)?;
		$crate::util::ser::Writeable::write(&$field, $stream)?;
	};
	($stream: expr, $type: expr, $field: expr, option) => {
		if let Some(ref field) = $field {
			$crate::_encode_tlv!($stream, $type, field, required);
		}
	};
}

#[doc(hidden)]
#[macro_export]
macro_rules! _get_tlv_len {
	($len: expr, $type: expr, $field: expr, required) => {
		let field_len = $crate::util::ser::Writeable::serialized_length(&$field);
		$len += $crate::util::ser::Writeable::serialized_length(&$crate::util::ser::BigSize($type))
			+ $crate::util::ser::Writeable::serialized_length(&$crate::util::ser::BigSize(field_len as u64))
			+ field_len;
	};
	($len: expr, $type: expr, $field: expr, option) => {
		if let Some(ref field) = $field {
			$crate::_get_tlv_len!($len, $type, field, required);
		}
	};
}

/// Writes out a length-prefixed TLV stream with the given fields. Fields must be listed in
/// strictly increasing type order.
#[macro_export]
macro_rules! write_tlv_fields {
	($stream: expr, {$(($type: expr, $field: expr, $fieldty: tt)),* $(,)*}) => {{
		#[allow(unused_mut)]
		let mut len: usize = 0;
		$(
			$crate::_get_tlv_len!(len, $type, $field, $fieldty);
		)*
		$crate::util::ser::Writeable::write(&$crate::util::ser::BigSize(len as u64), $stream)?;
		$(
			$crate::_encode_tlv!($stream, $type, $field, $fieldty);
		)*
	}};
}

/// Reads a TLV stream (without the length prefix) into the given `Option` variables, one per
/// field. Ordering and even/odd rules are enforced; `required` checks happen at struct
/// construction.
#[doc(hidden)]
#[macro_export]
macro_rules! decode_tlv_stream {
	($stream: expr, {$(($type: expr, $field: ident, $fieldty: tt)),* $(,)*}) => {{
		let stream_ref = $stream;
		let mut last_seen_type: Option<u64> = None;
		'tlv_read: loop {
			// A TLV stream may end at any record boundary, so a clean EOF on the type read is fine.
			let typ: $crate::util::ser::BigSize = {
				let mut tracking_reader = $crate::util::ser::ReadTrackingReader::new(&mut *stream_ref);
				match <$crate::util::ser::BigSize as $crate::util::ser::Readable>::read(&mut tracking_reader) {
					Err($crate::util::ser::DecodeError::ShortRead) => {
						if !tracking_reader.have_read {
							break 'tlv_read;
						} else {
							return Err($crate::util::ser::DecodeError::ShortRead);
						}
					},
					Err(e) => return Err(e),
					Ok(t) => t,
				}
			};
			if let Some(last) = last_seen_type {
				if typ.0 <= last {
					return Err($crate::util::ser::DecodeError::InvalidValue);
				}
			}
			last_seen_type = Some(typ.0);

			let length: $crate::util::ser::BigSize = $crate::util::ser::Readable::read(&mut *stream_ref)?;
			let mut s = $crate::util::ser::FixedLengthReader::new(&mut *stream_ref, length.0);
			match typ.0 {
				$($type => {
					$field = Some($crate::util::ser::Readable::read(&mut s)?);
					if s.bytes_remain() {
						s.eat_remaining()?;
						return Err($crate::util::ser::DecodeError::InvalidValue);
					}
				},)*
				t if t % 2 == 0 => {
					return Err($crate::util::ser::DecodeError::UnknownRequiredFeature);
				},
				_ => {},
			}
			s.eat_remaining()?;
		}
	}};
}

/// Reads a length-prefixed TLV stream into the given `Option` variables.
#[macro_export]
macro_rules! read_tlv_fields {
	($stream: expr, {$(($type: expr, $field: ident, $fieldty: tt)),* $(,)*}) => {{
		let tlv_len: $crate::util::ser::BigSize = $crate::util::ser::Readable::read($stream)?;
		let mut rd = $crate::util::ser::FixedLengthReader::new(&mut *$stream, tlv_len.0);
		$crate::decode_tlv_stream!(&mut rd, {$(($type, $field, $fieldty)),*});
		rd.eat_remaining()?;
	}};
}

#[doc(hidden)]
#[macro_export]
macro_rules! _init_tlv_field_var {
	($field: ident, required) => {
		let mut $field = None;
	};
	($field: ident, option) => {
		let mut $field = None;
	};
}

#[doc(hidden)]
#[macro_export]
macro_rules! _init_tlv_based_struct_field {
	($field: ident, required) => {
		$field.ok_or($crate::util::ser::DecodeError::InvalidValue)?
	};
	($field: ident, option) => {
		$field
	};
}

/// Implements [`Readable`]/[`Writeable`] for a struct, storing each listed field as a TLV record.
///
/// For example,
/// ```
/// # use lightning_forwarder::impl_writeable_tlv_based;
/// struct LightningMessage {
/// 	tlv_integer: u32,
/// 	tlv_default_integer: u32,
/// 	tlv_optional_integer: Option<u32>,
/// }
///
/// impl_writeable_tlv_based!(LightningMessage, {
/// 	(0, tlv_integer, required),
/// 	(2, tlv_default_integer, required),
/// 	(3, tlv_optional_integer, option),
/// });
/// ```
///
/// [`Readable`]: crate::util::ser::Readable
/// [`Writeable`]: crate::util::ser::Writeable
#[macro_export]
macro_rules! impl_writeable_tlv_based {
	($st: ident, {$(($type: expr, $field: ident, $fieldty: tt)),* $(,)*}) => {
		impl $crate::util::ser::Writeable for $st {
			fn write<W: $crate::util::ser::Writer>(&self, writer: &mut W) -> Result<(), std::io::Error> {
				$crate::write_tlv_fields!(writer, {
					$(($type, self.$field, $fieldty)),*
				});
				Ok(())
			}
		}

		impl $crate::util::ser::Readable for $st {
			fn read<R: std::io::Read>(reader: &mut R) -> Result<Self, $crate::util::ser::DecodeError> {
				$(
					$crate::_init_tlv_field_var!($field, $fieldty);
				)*
				$crate::read_tlv_fields!(reader, {
					$(($type, $field, $fieldty)),*
				});
				Ok(Self {
					$(
						$field: $crate::_init_tlv_based_struct_field!($field, $fieldty)
					),*
				})
			}
		}
	};
}

/// Implement [`Readable`] and [`Writeable`] for an enum, with struct variants stored as TLVs and
/// the variant id written as a leading byte. Unit variants are listed with an empty field set.
///
/// ```
/// # use lightning_forwarder::impl_writeable_tlv_based_enum;
/// enum EnumName {
/// 	StructVariantA {
/// 		required_variant_field: u64,
/// 		optional_variant_field: Option<u8>,
/// 	},
/// 	UnitVariantB,
/// }
///
/// impl_writeable_tlv_based_enum!(EnumName,
/// 	(0, StructVariantA) => {
/// 		(0, required_variant_field, required),
/// 		(1, optional_variant_field, option),
/// 	},
/// 	(1, UnitVariantB) => {},
/// );
/// ```
///
/// [`Readable`]: crate::util::ser::Readable
/// [`Writeable`]: crate::util::ser::Writeable
#[macro_export]
macro_rules! impl_writeable_tlv_based_enum {
	($st: ident, $(($variant_id: expr, $variant_name: ident) =>
		{$(($type: expr, $field: ident, $fieldty: tt)),* $(,)*}
	),* $(,)*) => {
		impl $crate::util::ser::Writeable for $st {
			fn write<W: $crate::util::ser::Writer>(&self, writer: &mut W) -> Result<(), std::io::Error> {
				match self {
					$($st::$variant_name { $(ref $field),* } => {
						let id: u8 = $variant_id;
						$crate::util::ser::Writeable::write(&id, writer)?;
						$crate::write_tlv_fields!(writer, {
							$(($type, *$field, $fieldty)),*
						});
					}),*
				}
				Ok(())
			}
		}

		impl $crate::util::ser::Readable for $st {
			fn read<R: std::io::Read>(reader: &mut R) -> Result<Self, $crate::util::ser::DecodeError> {
				let id: u8 = $crate::util::ser::Readable::read(reader)?;
				match id {
					$($variant_id => {
						$(
							$crate::_init_tlv_field_var!($field, $fieldty);
						)*
						$crate::read_tlv_fields!(reader, {
							$(($type, $field, $fieldty)),*
						});
						Ok($st::$variant_name {
							$(
								$field: $crate::_init_tlv_based_struct_field!($field, $fieldty)
							),*
						})
					}),*
					_ => Err($crate::util::ser::DecodeError::UnknownRequiredFeature),
				}
			}
		}
	};
}

#[cfg(test)]
mod tests {
	use crate::util::ser::{BigSize, DecodeError, Readable, Writeable};
	use std::io::Cursor;

	#[derive(Debug, PartialEq)]
	struct TestRecord {
		a: u64,
		b: Option<u16>,
		c: String,
	}

	impl_writeable_tlv_based!(TestRecord, {
		(0, a, required),
		(1, b, option),
		(2, c, required),
	});

	#[derive(Debug, PartialEq)]
	enum TestEnum {
		WithFields { x: u32, y: Option<u64> },
		Empty,
	}

	impl_writeable_tlv_based_enum!(TestEnum,
		(0, WithFields) => {
			(0, x, required),
			(1, y, option),
		},
		(2, Empty) => {},
	);

	fn hex(bytes: &[u8]) -> String {
		bytes.iter().map(|b| format!("{:02x}", b)).collect()
	}

	#[test]
	fn tlv_record_layout() {
		let rec = TestRecord { a: 1, b: None, c: "hi".to_owned() };
		// len 14: (type 0, len 8, u64), (type 2, len 2, "hi")
		assert_eq!(hex(&rec.encode()), "0e0008000000000000000102026869");
		let read: TestRecord = Readable::read(&mut Cursor::new(rec.encode())).unwrap();
		assert_eq!(read, rec);

		let rec = TestRecord { a: 7, b: Some(3), c: String::new() };
		let read: TestRecord = Readable::read(&mut Cursor::new(rec.encode())).unwrap();
		assert_eq!(read, rec);
	}

	#[test]
	fn missing_required_field_is_invalid() {
		// Only type 0 present.
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&BigSize(10).encode());
		bytes.extend_from_slice(&[0x00, 0x08]);
		bytes.extend_from_slice(&5u64.encode());
		assert_eq!(<TestRecord as Readable>::read(&mut Cursor::new(bytes)), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn unknown_odd_skipped_unknown_even_rejected() {
		let rec = TestRecord { a: 9, b: None, c: "x".to_owned() };
		let mut body = rec.encode()[1..].to_vec();
		// Append odd type 5 with one byte of junk.
		body.extend_from_slice(&[0x05, 0x01, 0xff]);
		let mut bytes = BigSize(body.len() as u64).encode();
		bytes.extend_from_slice(&body);
		let read: TestRecord = Readable::read(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(read, rec);

		let mut body = rec.encode()[1..].to_vec();
		body.extend_from_slice(&[0x04, 0x01, 0xff]);
		let mut bytes = BigSize(body.len() as u64).encode();
		bytes.extend_from_slice(&body);
		assert_eq!(
			<TestRecord as Readable>::read(&mut Cursor::new(bytes)),
			Err(DecodeError::UnknownRequiredFeature)
		);
	}

	#[test]
	fn out_of_order_types_rejected() {
		let mut body = Vec::new();
		body.extend_from_slice(&[0x02, 0x01, b'z']);
		body.extend_from_slice(&[0x00, 0x08]);
		body.extend_from_slice(&1u64.encode());
		let mut bytes = BigSize(body.len() as u64).encode();
		bytes.extend_from_slice(&body);
		assert_eq!(<TestRecord as Readable>::read(&mut Cursor::new(bytes)), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn enum_variants() {
		for v in [TestEnum::WithFields { x: 4, y: Some(8) }, TestEnum::WithFields { x: 0, y: None }, TestEnum::Empty] {
			let read: TestEnum = Readable::read(&mut Cursor::new(v.encode())).unwrap();
			assert_eq!(read, v);
		}
		assert_eq!(<TestEnum as Readable>::read(&mut Cursor::new(vec![1u8, 0])), Err(DecodeError::UnknownRequiredFeature));
	}
}
