//! Helpers for the USB-MIDI transport.

use wmidi::MidiMessage;

/// Construct MIDI messages from data assumed to be USB-MIDI Event Packets.
///
/// Given bytes, returns an iterator over the MIDI messages therein. Truncated packets and packets which don't hold a
/// valid message (e.g., the zero padding some hosts send) are skipped.
pub fn usb_midi_messages(data: &[u8]) -> impl Iterator<Item = MidiMessage<'_>> {
    data.chunks(4).filter_map(|potential_packet| {
        if potential_packet.len() != 4 {
            warn!("USB-MIDI Event Packets must always be 32 bits long");
            None
        } else {
            // the zeroth byte is intentionally ignored because the Packet Header is not of interest; the remaining
            // three bytes contain the actual MIDI event
            MidiMessage::from_bytes(&potential_packet[1..]).ok()
        }
    })
}
