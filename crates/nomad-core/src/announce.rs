//! Decoding of peer announce application data.

/// Extract the display name from delivery announce app data.
///
/// Current announces carry a msgpack array `[display_name, stamp_cost]`;
/// older peers announce the raw UTF-8 name.
pub fn display_name_from_app_data(app_data: &[u8]) -> Option<String> {
    let first_byte = *app_data.first()?;

    if (0x90..=0x9f).contains(&first_byte) || first_byte == 0xdc {
        let mut cursor = std::io::Cursor::new(app_data);
        let peer_data = rmpv::decode::read_value(&mut cursor).ok()?;

        match peer_data {
            rmpv::Value::Array(arr) => match arr.first()? {
                rmpv::Value::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
                rmpv::Value::String(s) => s.as_str().map(|s| s.to_string()),
                _ => None,
            },
            _ => None,
        }
    } else {
        String::from_utf8(app_data.to_vec()).ok()
    }
}
