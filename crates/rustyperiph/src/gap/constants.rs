// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;

// HCI status and disconnect reason codes
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_ERR_CONN_TIMEOUT: u8 = 0x08;
pub const HCI_ERR_CONN_ACCEPT_TIMEOUT: u8 = 0x10;
pub const HCI_ERR_REMOTE_USER_TERM_CONN: u8 = 0x13;
pub const HCI_ERR_LOCALHOST_TERM_CONN: u8 = 0x16;
pub const HCI_ERR_ADV_TIMEOUT: u8 = 0x3C;
pub const HCI_ERR_CONN_FAIL_TO_ESTAB: u8 = 0x3E;

// Advertising intervals (0.625 ms units)
pub const ADV_INTERVAL_MIN: u16 = 0x0020; // 20 ms
pub const ADV_INTERVAL_MAX: u16 = 0x4000; // 10.24 s
pub const GAP_ADV_FAST_INT_MIN_1: u16 = 0x0030; // 30 ms
pub const GAP_ADV_FAST_INT_MAX_1: u16 = 0x0060; // 60 ms
pub const GAP_ADV_FAST_INT_MIN_2: u16 = 0x00A0; // 100 ms
pub const GAP_ADV_FAST_INT_MAX_2: u16 = 0x00F0; // 150 ms

// Advertising payload limits
pub const LEGACY_ADV_DATA_MAX: usize = 31;
pub const EXT_ADV_DATA_MAX: usize = 251;

// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL: u8 = 0x02;
pub const ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE: u8 = 0x03;
pub const ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL: u8 = 0x06;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const ADV_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
pub const ADV_TYPE_APPEARANCE: u8 = 0x19;
pub const ADV_TYPE_MANUFACTURER_SPECIFIC: u8 = 0xFF;

// Assigned service UUIDs
pub const UUID_HRS: u16 = 0x180D;
pub const UUID_BAS: u16 = 0x180F;
pub const UUID_DIS: u16 = 0x180A;
pub const UUID_CTS: u16 = 0x1805;
