//! Protocol constants for PIV provisioning.

/// Factory-default PIV management key (3DES, 24 bytes).
///
/// A device that still accepts this key has never been provisioned; the
/// enroll workflow uses that as its "virgin device" check.
pub const DEFAULT_MANAGEMENT_KEY: [u8; 24] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, //
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, //
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
];

/// Factory-default PIV PIN.
pub const DEFAULT_PIN: &str = "123456";

/// Factory-default PIV PUK.
pub const DEFAULT_PUK: &str = "12345678";
