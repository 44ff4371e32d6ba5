use std::sync::Arc;

/// One missing sequence position the buffer needs content for. `data` points
/// straight into the buffer's storage for that position and arrives zeroed.
#[derive(Debug)]
pub struct ConcealmentSlot<'a> {
    pub sequence_number: u64,
    pub data: &'a mut [u8],
}

/// Synthesizes replacement content for missing positions.
///
/// Called with every contiguous run of missing positions the buffer has to
/// serve, one slot per position. Handlers run while the buffer is locked and
/// must not call back into it.
pub trait Concealment: Send + Sync {
    fn conceal(&self, slots: &mut [ConcealmentSlot<'_>]);
}

impl<F> Concealment for F
where
    F: Fn(&mut [ConcealmentSlot<'_>]) + Send + Sync,
{
    fn conceal(&self, slots: &mut [ConcealmentSlot<'_>]) {
        self(slots)
    }
}

pub type SharedConcealment = Arc<dyn Concealment>;

/// Leaves concealed positions as silence.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silence;

impl Silence {
    pub fn shared() -> SharedConcealment {
        Arc::new(Silence)
    }
}

impl Concealment for Silence {
    fn conceal(&self, _slots: &mut [ConcealmentSlot<'_>]) {}
}
