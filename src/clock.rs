/// Monotonic time source used for deadlines and poll scheduling.
///
/// Waiting itself goes through [`embedded_hal_async::delay::DelayNs`]; this
/// trait only tells the driver how much time has passed.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin. Must never go backwards.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
