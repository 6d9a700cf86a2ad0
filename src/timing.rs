// Wait/alignment calculator: frame durations to hardware-legal wait counts
use crate::config::HardwareConfig;
use crate::frame::Frame;

/// Rounds `duration` up to the next multiple of `quantum`.
///
/// Never rounds down: a short wait would put the card ahead of the sequence.
///
/// ```
/// use pulsecompiler_backend::timing::align_wait;
///
/// assert_eq!(align_wait(5, 1), 5);
/// assert_eq!(align_wait(5, 4), 8);
/// assert_eq!(align_wait(8, 4), 8);
/// ```
pub fn align_wait(duration: u64, quantum: u64) -> u64 {
    duration.div_ceil(quantum) * quantum
}

/// Aligned wait of every frame, in frame order.
pub fn aligned_waits(config: &HardwareConfig, frames: &[Frame]) -> Vec<u64> {
    let quantum = config.alignment_quantum();
    frames
        .iter()
        .map(|frame| align_wait(frame.duration, quantum))
        .collect()
}

/// Splits `cycles` into `wait` instructions no longer than `max_wait_cycles`:
/// as many full-length waits as fit, then the remainder if non-zero.
///
/// ```
/// use pulsecompiler_backend::timing::split_wait;
///
/// assert_eq!(split_wait(10, 4), vec![4, 4, 2]);
/// assert_eq!(split_wait(8, 4), vec![4, 4]);
/// assert!(split_wait(0, 4).is_empty());
/// ```
pub fn split_wait(cycles: u64, max_wait_cycles: u64) -> Vec<u64> {
    let full = (cycles / max_wait_cycles) as usize;
    let mut waits = vec![max_wait_cycles; full];
    let remainder = cycles % max_wait_cycles;
    if remainder != 0 {
        waits.push(remainder);
    }
    waits
}

#[cfg(test)]
mod test {
    use crate::config::HSDIO_MAX_WAIT_CYCLES;
    use crate::timing::*;

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_wait(1, 32), 32);
        assert_eq!(align_wait(33, 32), 64);
        assert_eq!(align_wait(0, 32), 0);
    }

    #[test]
    fn aligned_waits_follow_frames() {
        let config = HardwareConfig::default().with_alignment_quantum(4).unwrap();
        let frames: Vec<Frame> = [3, 4, 9, 1]
            .iter()
            .map(|&duration| Frame {
                index: 0,
                state: crate::frame::ChannelState::low(1),
                duration,
            })
            .collect();
        assert_eq!(aligned_waits(&config, &frames), vec![4, 4, 12, 4]);
    }

    #[test]
    fn split_preserves_total_and_aligned_ceiling() {
        let cycles = 3 * HSDIO_MAX_WAIT_CYCLES + 96;
        let waits = split_wait(cycles, HSDIO_MAX_WAIT_CYCLES);
        assert_eq!(waits.len(), 4);
        assert_eq!(waits.iter().sum::<u64>(), cycles);
        assert!(waits.iter().all(|&w| w <= HSDIO_MAX_WAIT_CYCLES && w % 32 == 0));
    }
}
