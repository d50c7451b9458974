/// Sender marker of lines coming from the cashless peripheral.
pub const INBOUND_SENDER: &str = "c";
/// Sender marker of lines we write to the peripheral.
pub const OUTBOUND_SENDER: &str = "C";

/// Splits one inbound line into its tokens, dropping the sender marker.
///
/// Lines from any other sender (echoes of our own commands, bootloader noise) yield `None`.
pub fn decode(line: &str) -> Option<Vec<String>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut tokens = line.split(',');
    if tokens.next()? != INBOUND_SENDER {
        return None;
    }
    Some(tokens.map(str::to_string).collect())
}

/// Frames a command payload for the wire.
pub fn encode(payload: &str) -> String {
    format!("{OUTBOUND_SENDER},{payload}\n")
}
