//! Tunnel stream framing
//!
//! A tunnel is a private stream on a custom domain. Sub-streams opened inside
//! it travel as complete messages nested in Generic messages on the tunnel
//! stream, each carrying the next tunnel sequence number. Sequence numbers
//! start at 1 in each direction; a receiver seeing any other number closes
//! the tunnel.

use types::{Data, DomainType, GenericMsg, Msg};

/// Wrap `inner` for the tunnel stream `stream_id`
pub fn wrap(stream_id: i32, domain: DomainType, seq: u32, inner: Msg) -> GenericMsg {
    GenericMsg::new()
        .stream_id(stream_id)
        .domain(domain)
        .seq_num(seq)
        .payload(Data::Msg(Box::new(inner)))
}

/// Sequence number and nested message of a tunnel generic
pub fn unwrap(generic: &GenericMsg) -> Option<(u32, &Msg)> {
    let inner = generic.payload.as_msg()?;
    Some((generic.seq_num.unwrap_or(0), inner))
}

/// Per-direction sequence counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSequence {
    next_out: u32,
    expected_in: u32,
}

impl Default for TunnelSequence {
    fn default() -> Self {
        Self {
            next_out: 1,
            expected_in: 1,
        }
    }
}

impl TunnelSequence {
    pub fn next_out(&mut self) -> u32 {
        let seq = self.next_out;
        self.next_out = self.next_out.wrapping_add(1);
        seq
    }

    /// Accept `seq` if it is the next expected one
    pub fn accept(&mut self, seq: u32) -> bool {
        if seq != self.expected_in {
            return false;
        }
        self.expected_in = self.expected_in.wrapping_add(1);
        true
    }

    pub fn expected_in(&self) -> u32 {
        self.expected_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ReqMsg;

    #[test]
    fn wrapped_message_unwraps_with_sequence() {
        let inner = Msg::from(ReqMsg::new().stream_id(1).name("ITEM"));
        let generic = wrap(7, DomainType::new(200).unwrap(), 3, inner.clone());
        assert_eq!(generic.stream_id, 7);
        assert_eq!(unwrap(&generic), Some((3, &inner)));
        assert_eq!(unwrap(&GenericMsg::new()), None);
    }

    #[test]
    fn out_of_order_sequence_is_rejected() {
        let mut sequence = TunnelSequence::default();
        assert_eq!(sequence.next_out(), 1);
        assert_eq!(sequence.next_out(), 2);
        assert!(sequence.accept(1));
        assert!(!sequence.accept(3));
        assert!(sequence.accept(2));
    }
}
