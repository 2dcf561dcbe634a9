//! NRPN (non-registered parameter number) decoding.
//!
//! An NRPN message is four controllers: parameter number high (99) and low
//! (98), then data entry high (6) and low (38). Setting either parameter
//! byte clears the data bytes; data bytes are only accepted once both
//! parameter bytes are known.

use cadenza_synth::cc;

/// A complete NRPN message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nrpn {
    /// Parameter number, high byte
    pub param_hi: u8,
    /// Parameter number, low byte
    pub param_lo: u8,
    /// Data entry, high byte
    pub value_hi: u8,
    /// Data entry, low byte
    pub value_lo: u8,
}

/// Accumulates NRPN controllers.
#[derive(Debug, Clone, Default)]
pub struct NrpnDecoder {
    param_hi: Option<u8>,
    param_lo: Option<u8>,
    value_hi: Option<u8>,
    value_lo: Option<u8>,
    receive: bool,
}

impl NrpnDecoder {
    /// A decoder that accepts NRPNs.
    pub fn new() -> Self {
        Self {
            receive: true,
            ..Self::default()
        }
    }

    /// True for the four controller numbers this decoder consumes.
    pub fn handles(number: u16) -> bool {
        matches!(
            number,
            cc::NRPN_HI | cc::NRPN_LO | cc::DATA_ENTRY_HI | cc::DATA_ENTRY_LO
        )
    }

    /// Whether completed messages are reported.
    pub fn receive(&self) -> bool {
        self.receive
    }

    /// Enable or disable reporting of completed messages.
    pub fn set_receive(&mut self, receive: bool) {
        self.receive = receive;
    }

    /// Feed one controller. Returns the message once all four bytes are
    /// set. Data bytes stay latched, so a following data entry re-reports.
    pub fn feed(&mut self, number: u16, value: u16) -> Option<Nrpn> {
        let value = value.min(127) as u8;
        match number {
            cc::NRPN_HI => {
                self.param_hi = Some(value);
                self.clear_data();
            }
            cc::NRPN_LO => {
                self.param_lo = Some(value);
                self.clear_data();
            }
            cc::DATA_ENTRY_HI if self.has_param() => self.value_hi = Some(value),
            cc::DATA_ENTRY_LO if self.has_param() => self.value_lo = Some(value),
            _ => return None,
        }
        self.current()
    }

    /// The complete message, if any.
    pub fn current(&self) -> Option<Nrpn> {
        if !self.receive {
            return None;
        }
        Some(Nrpn {
            param_hi: self.param_hi?,
            param_lo: self.param_lo?,
            value_hi: self.value_hi?,
            value_lo: self.value_lo?,
        })
    }

    fn has_param(&self) -> bool {
        self.param_hi.is_some() && self.param_lo.is_some()
    }

    fn clear_data(&mut self) {
        self.value_hi = None;
        self.value_lo = None;
    }
}
