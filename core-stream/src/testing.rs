//! Mock devices shared by unit tests

use bridge_traits::{error::Result as BridgeResult, Device, SeekOrigin};
use mockall::mock;

mock! {
    pub ByteDevice {}

    impl Device for ByteDevice {
        type Unit = u8;

        fn write(&mut self, data: &[u8]) -> BridgeResult<()>;
        fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize>;
        fn seek(&mut self, offset: i64, origin: SeekOrigin) -> BridgeResult<u64>;
        fn close(&mut self) -> BridgeResult<()>;
    }
}

mock! {
    pub WideDevice {}

    impl Device for WideDevice {
        type Unit = u16;

        fn write(&mut self, data: &[u16]) -> BridgeResult<()>;
        fn read(&mut self, buf: &mut [u16]) -> BridgeResult<usize>;
        fn seek(&mut self, offset: i64, origin: SeekOrigin) -> BridgeResult<u64>;
        fn close(&mut self) -> BridgeResult<()>;
    }
}

/// Byte mock that accepts a close, as every test writer is closed on drop.
pub fn byte_device() -> MockByteDevice {
    let mut device = MockByteDevice::new();
    device.expect_close().returning(|| Ok(()));
    device
}

pub fn wide_device() -> MockWideDevice {
    let mut device = MockWideDevice::new();
    device.expect_close().returning(|| Ok(()));
    device
}
