/// Monotonic admission filter over RTP sequence numbers.
///
/// Tracks the highest sequence number admitted so far (the high-water
/// mark). A packet is admitted only if it is newer than the mark; equal or
/// older packets are dropped. Nothing is buffered or re-sequenced.
///
/// "Newer" uses 16-bit serial arithmetic: `seq` is newer than `mark` when
/// `seq.wrapping_sub(mark)` is in `1..0x8000`. This keeps admission working
/// across the `65535 -> 0` wrap. A forward jump of `0x8000` or more is
/// indistinguishable from a late packet and is dropped.
#[derive(Debug, Default, Clone)]
pub struct SequenceFilter {
    high_water: Option<u16>,
}

const HALF_RANGE: u16 = 0x8000;

impl SequenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest admitted sequence number, `None` before the first packet.
    pub fn high_water(&self) -> Option<u16> {
        self.high_water
    }

    /// Admit or drop `seq`. Advances the high-water mark on admission.
    pub fn admit(&mut self, seq: u16) -> bool {
        let newer = match self.high_water {
            None => true,
            Some(mark) => {
                let delta = seq.wrapping_sub(mark);
                delta != 0 && delta < HALF_RANGE
            }
        };
        if newer {
            self.high_water = Some(seq);
        }
        newer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(seqs: &[u16]) -> Vec<u16> {
        let mut filter = SequenceFilter::new();
        seqs.iter().copied().filter(|&s| filter.admit(s)).collect()
    }

    #[test]
    fn drops_late_and_duplicate_packets() {
        assert_eq!(admitted(&[5, 3, 7, 7, 10]), vec![5, 7, 10]);
    }

    #[test]
    fn first_packet_is_always_admitted() {
        let mut filter = SequenceFilter::new();
        assert_eq!(filter.high_water(), None);
        assert!(filter.admit(40_000));
        assert_eq!(filter.high_water(), Some(40_000));
    }

    #[test]
    fn admits_across_wraparound() {
        assert_eq!(
            admitted(&[65_534, 65_535, 0, 65_535, 1]),
            vec![65_534, 65_535, 0, 1]
        );
    }

    #[test]
    fn gaps_are_skipped_not_waited_for() {
        assert_eq!(admitted(&[1, 4, 2, 3, 5]), vec![1, 4, 5]);
    }

    #[test]
    fn half_range_jump_is_treated_as_late() {
        let mut filter = SequenceFilter::new();
        assert!(filter.admit(10));
        assert!(!filter.admit(10 + HALF_RANGE));
        assert!(filter.admit(10 + HALF_RANGE - 1));
    }
}
