//! Port devices and the I/O bus.
//!
//! The bus models an open-collector arrangement: a read ANDs together the
//! response of every input mapping (a device that is not driving the port
//! contributes all-ones), while a write is broadcast to every output mapping
//! in registration order and each device decides for itself whether the port
//! is relevant.

/// A named peripheral that can respond on the processor's I/O ports.
///
/// The defaults make a device inert: reads float high, writes are ignored.
/// Implementations override whichever side they actually drive.
pub trait Device: Send {
    /// Identifying name, used in logs and debug views.
    fn name(&self) -> &str;

    /// Read a byte from an I/O port.
    fn read_port(&mut self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write a byte to an I/O port.
    fn write_port(&mut self, port: u16, value: u8) {
        let _ = (port, value);
    }
}

/// Handle to a device attached to an [`IoBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(usize);

/// Binds an attached device to the inclusive port range it claims.
///
/// Mappings are only mutated at machine construction and teardown, never on
/// the execution path, so a plain ordered list is all the structure needed.
#[derive(Debug, Clone, Copy)]
pub struct DeviceMapping {
    device: DeviceId,
    first: u16,
    last: u16,
}

impl DeviceMapping {
    pub fn new(device: DeviceId, first: u16, last: u16) -> Self {
        Self {
            device,
            first,
            last,
        }
    }

    pub fn covers(&self, port: u16) -> bool {
        port >= self.first && port <= self.last
    }
}

/// Arena of port devices plus the ordered input/output mapping tables.
///
/// Devices are owned here and referred to by index, so mappings never hold
/// aliased references into the device graph.
#[derive(Default)]
pub struct IoBus {
    devices: Vec<Box<dyn Device>>,
    inputs: Vec<DeviceMapping>,
    outputs: Vec<DeviceMapping>,
}

impl IoBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a device and return its handle.
    pub fn attach(&mut self, device: Box<dyn Device>) -> DeviceId {
        self.devices.push(device);
        DeviceId(self.devices.len() - 1)
    }

    /// Register `device` as an input source for the inclusive port range.
    pub fn map_input(&mut self, device: DeviceId, first: u16, last: u16) {
        self.inputs.push(DeviceMapping::new(device, first, last));
    }

    /// Register `device` as an output sink. The range is advisory: writes are
    /// broadcast to every output mapping and devices self-filter.
    pub fn map_output(&mut self, device: DeviceId, first: u16, last: u16) {
        self.outputs.push(DeviceMapping::new(device, first, last));
    }

    /// Remove every input mapping for `device`.
    pub fn unmap_input(&mut self, device: DeviceId) {
        self.inputs.retain(|m| m.device != device);
    }

    /// Remove every output mapping for `device`.
    pub fn unmap_output(&mut self, device: DeviceId) {
        self.outputs.retain(|m| m.device != device);
    }

    pub fn device_mut(&mut self, id: DeviceId) -> &mut dyn Device {
        self.devices[id.0].as_mut()
    }

    /// AND of every covering input mapping's response; 0xFF when nothing
    /// covers the port.
    pub fn input(&mut self, port: u16) -> u8 {
        let mut result = 0xFF;
        for index in 0..self.inputs.len() {
            let mapping = self.inputs[index];
            if mapping.covers(port) {
                result &= self.devices[mapping.device.0].read_port(port);
            }
        }
        result
    }

    /// Broadcast `value` to every output mapping in registration order.
    pub fn output(&mut self, port: u16, value: u8) {
        for index in 0..self.outputs.len() {
            let mapping = self.outputs[index];
            self.devices[mapping.device.0].write_port(port, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DrivePort {
        value: u8,
        reads: Arc<AtomicUsize>,
    }

    impl Device for DrivePort {
        fn name(&self) -> &str {
            "drive"
        }

        fn read_port(&mut self, _port: u16) -> u8 {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.value
        }
    }

    struct Recorder {
        seen: Arc<std::sync::Mutex<Vec<(u16, u8)>>>,
    }

    impl Device for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn write_port(&mut self, port: u16, value: u8) {
            self.seen.lock().unwrap().push((port, value));
        }
    }

    #[test]
    fn input_is_and_of_covering_mappings() {
        let mut bus = IoBus::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let a = bus.attach(Box::new(DrivePort {
            value: 0b1111_0000,
            reads: Arc::clone(&reads),
        }));
        let b = bus.attach(Box::new(DrivePort {
            value: 0b1010_1010,
            reads: Arc::clone(&reads),
        }));
        bus.map_input(a, 0x10, 0x1F);
        bus.map_input(b, 0x10, 0x1F);

        assert_eq!(bus.input(0x10), 0b1010_0000);
        assert_eq!(reads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn input_floats_high_when_uncovered() {
        let mut bus = IoBus::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let a = bus.attach(Box::new(DrivePort {
            value: 0x00,
            reads: Arc::clone(&reads),
        }));
        bus.map_input(a, 0x10, 0x1F);

        assert_eq!(bus.input(0x20), 0xFF);
        assert_eq!(reads.load(Ordering::Relaxed), 0);
        assert_eq!(IoBus::new().input(0x42), 0xFF);
    }

    #[test]
    fn output_broadcasts_regardless_of_range() {
        let mut bus = IoBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = bus.attach(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }));
        let second = bus.attach(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }));
        bus.map_output(first, 0x00, 0x0F);
        bus.map_output(second, 0x40, 0x4F);

        // Port 0x80 is outside both ranges; both devices still hear it.
        bus.output(0x80, 0xAB);

        assert_eq!(*seen.lock().unwrap(), vec![(0x80, 0xAB), (0x80, 0xAB)]);
    }

    #[test]
    fn unmap_removes_device_mappings() {
        let mut bus = IoBus::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let a = bus.attach(Box::new(DrivePort {
            value: 0x00,
            reads: Arc::clone(&reads),
        }));
        bus.map_input(a, 0x00, 0xFF);
        assert_eq!(bus.input(0x05), 0x00);

        bus.unmap_input(a);
        assert_eq!(bus.input(0x05), 0xFF);
    }
}
