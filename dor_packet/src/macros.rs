/*! Macros for test functions
*/

pub(crate) fn decode_as_same_type<'a, T: dor_binary_io::FromBytes>(
    buf: &'a [u8],
    _sample: &T,
) -> (&'a [u8], T) {
    T::from_bytes(buf).expect("should decode")
}

macro_rules! encode_decode_test (
    ($test:ident, $value:expr) => (
        #[test]
        fn $test() {
            use dor_binary_io::ToBytes;

            let value = $value;
            let mut buf = [0; crate::onion::ONION_PACKET_SIZE + crate::packet::PACKET_HEADER_SIZE];
            let (_, size) = value.to_bytes((&mut buf, 0)).expect("should encode");
            let (rest, decoded_value) = crate::macros::decode_as_same_type(&buf[..size], &value);
            assert!(rest.is_empty());
            assert_eq!(decoded_value, value);
        }
    )
);
