//! Hardware seams between the driver and the board it runs on.

/// SPI link to the controller, including its chip-select line.
///
/// Every command the driver issues is framed by [`select`](SpiBus::select) and
/// [`deselect`](SpiBus::deselect); the chip decodes the first byte after chip-select falls as
/// the opcode.
pub trait SpiBus {
    /// Drive chip-select low.
    fn select(&mut self);

    /// Drive chip-select high, ending the current command.
    fn deselect(&mut self);

    /// Full-duplex transfer: shifts `buf` out and replaces it with the bytes shifted in.
    fn transfer(&mut self, buf: &mut [u8]);

    /// Shift `bytes` out, discarding whatever comes back.
    fn write(&mut self, bytes: &[u8]) {
        let mut chunk = [0u8; 32];
        for part in bytes.chunks(chunk.len()) {
            let out = &mut chunk[..part.len()];
            out.copy_from_slice(part);
            self.transfer(out);
        }
    }

    /// Clock in `buf.len()` bytes while shifting out zeros.
    fn read(&mut self, buf: &mut [u8]) {
        buf.fill(0);
        self.transfer(buf);
    }
}

impl<T: SpiBus + ?Sized> SpiBus for Box<T> {
    fn select(&mut self) {
        <T as SpiBus>::select(&mut **self);
    }

    fn deselect(&mut self) {
        <T as SpiBus>::deselect(&mut **self);
    }

    fn transfer(&mut self, buf: &mut [u8]) {
        <T as SpiBus>::transfer(&mut **self, buf);
    }

    fn write(&mut self, bytes: &[u8]) {
        <T as SpiBus>::write(&mut **self, bytes);
    }

    fn read(&mut self, buf: &mut [u8]) {
        <T as SpiBus>::read(&mut **self, buf);
    }
}

impl<T: SpiBus + ?Sized> SpiBus for &mut T {
    fn select(&mut self) {
        <T as SpiBus>::select(&mut **self);
    }

    fn deselect(&mut self) {
        <T as SpiBus>::deselect(&mut **self);
    }

    fn transfer(&mut self, buf: &mut [u8]) {
        <T as SpiBus>::transfer(&mut **self, buf);
    }

    fn write(&mut self, bytes: &[u8]) {
        <T as SpiBus>::write(&mut **self, bytes);
    }

    fn read(&mut self, buf: &mut [u8]) {
        <T as SpiBus>::read(&mut **self, buf);
    }
}

impl<T: SpiBus + ?Sized> SpiBus for std::rc::Rc<std::cell::RefCell<T>> {
    fn select(&mut self) {
        self.borrow_mut().select();
    }

    fn deselect(&mut self) {
        self.borrow_mut().deselect();
    }

    fn transfer(&mut self, buf: &mut [u8]) {
        self.borrow_mut().transfer(buf);
    }

    fn write(&mut self, bytes: &[u8]) {
        self.borrow_mut().write(bytes);
    }

    fn read(&mut self, buf: &mut [u8]) {
        self.borrow_mut().read(buf);
    }
}

/// Blocking delay source. The driver and the session layer never sleep any other way.
pub trait Delay {
    fn delay_us(&mut self, us: u32);

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

impl<T: Delay + ?Sized> Delay for Box<T> {
    fn delay_us(&mut self, us: u32) {
        <T as Delay>::delay_us(&mut **self, us);
    }

    fn delay_ms(&mut self, ms: u32) {
        <T as Delay>::delay_ms(&mut **self, ms);
    }
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay_us(&mut self, us: u32) {
        <T as Delay>::delay_us(&mut **self, us);
    }

    fn delay_ms(&mut self, ms: u32) {
        <T as Delay>::delay_ms(&mut **self, ms);
    }
}

/// Sleeps the calling thread. For hosts where the SPI adapter is driven from user space.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingDelay {
        calls: u32,
        total_us: u64,
    }

    impl Delay for CountingDelay {
        fn delay_us(&mut self, us: u32) {
            self.calls += 1;
            self.total_us += us as u64;
        }
    }

    #[derive(Default)]
    struct Loopback {
        selected: bool,
        seen: Vec<u8>,
    }

    impl SpiBus for Loopback {
        fn select(&mut self) {
            self.selected = true;
        }

        fn deselect(&mut self) {
            self.selected = false;
        }

        fn transfer(&mut self, buf: &mut [u8]) {
            assert!(self.selected);
            self.seen.extend_from_slice(buf);
        }
    }

    #[test]
    fn default_delay_ms_is_built_from_microseconds() {
        let mut delay = CountingDelay::default();
        delay.delay_ms(3);
        assert_eq!(delay.calls, 3);
        assert_eq!(delay.total_us, 3_000);
    }

    #[test]
    fn std_delay_sleeps_at_least_requested() {
        let start = std::time::Instant::now();
        StdDelay.delay_ms(2);
        assert!(start.elapsed() >= std::time::Duration::from_millis(2));
    }

    #[test]
    fn write_chunks_long_buffers() {
        let mut bus = Loopback::default();
        let data: Vec<u8> = (0..100u8).collect();
        let mut boxed: Box<dyn SpiBus + '_> = Box::new(&mut bus);
        boxed.select();
        boxed.write(&data);
        boxed.deselect();
        drop(boxed);
        assert_eq!(bus.seen, data);
    }
}
