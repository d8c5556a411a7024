/*!
 * Parsing of the commands typed at the monitor prompt.
 */
use std::fmt;

use loralink_core::types::{Bandwidth, PostMode, StatusInterval};

/// One thing the user asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// `gain <dBm>`
    Gain(i8),
    /// `freq <MHz>`
    Frequency(f64),
    /// `sf <n>`
    SpreadingFactor(u8),
    /// `bw <kHz>`
    Bandwidth(Bandwidth),
    /// `status on|off`
    StatusEnabled(bool),
    /// `interval <s>`
    StatusInterval(StatusInterval),
    /// `wifi on|off`
    Wifi(bool),
    /// `post time|lora`
    PostMode(PostMode),
    /// `data <text>`
    Data(String),
    /// `flash`
    Flash,
    /// `sync`
    Sync,
    /// `status?`
    RequestStatus,
    /// `state`, print the mirrored configuration
    ShowState,
    /// `log short|full`
    ShortLog(bool),
    /// `reconnect`
    Reconnect,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Why a typed line was not understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

fn error<T, S: Into<String>>(msg: S) -> Result<T, ParseError> {
    Err(ParseError(msg.into()))
}

/// Prompt help text
pub const HELP: &str = "\
gain <dBm>          set transmit gain (-9..22)
freq <MHz>          set carrier frequency
sf <5-12>           set spreading factor
bw <kHz>            set bandwidth (7.8 .. 500)
status on|off       periodic status packets
interval <s>        status interval (10, 30, 60, 120, 180)
wifi on|off         device WiFi
post time|lora      POST periodically or on LoRa receive
data <text>         transmit text over LoRa
flash               dump the device flash log
sync                re-read the device configuration
status?             ask for WiFi and HTTP status
state               print the mirrored configuration
log short|full      only radio activity, or everything
reconnect           connect again after a disconnect
help                this text
quit                disconnect and exit";

fn on_off(word: &str) -> Result<bool, ParseError> {
    match word {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => error(format!("expected on or off, got {:?}", other)),
    }
}

fn number<T: std::str::FromStr>(word: &str, what: &str) -> Result<T, ParseError> {
    word.parse()
        .or_else(|_| error(format!("{} is not a valid {}", word, what)))
}

fn needs_arg<'a>(rest: &'a str, name: &str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        error(format!("{} needs a value", name))
    } else {
        Ok(rest)
    }
}

/// Parse one typed line
pub fn parse(line: &str) -> Result<Intent, ParseError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "gain" => Ok(Intent::Gain(number(needs_arg(rest, "gain")?, "gain")?)),
        "freq" => Ok(Intent::Frequency(number(needs_arg(rest, "freq")?, "frequency")?)),
        "sf" => Ok(Intent::SpreadingFactor(number(needs_arg(rest, "sf")?, "spreading factor")?)),
        "bw" => {
            let khz: f64 = number(needs_arg(rest, "bw")?, "bandwidth")?;
            Bandwidth::from_khz(khz)
                .map(Intent::Bandwidth)
                .ok_or_else(|| ParseError(format!("{} kHz is not a supported bandwidth", khz)))
        }
        "status" => Ok(Intent::StatusEnabled(on_off(needs_arg(rest, "status")?)?)),
        "status?" => Ok(Intent::RequestStatus),
        "interval" => {
            let secs: u32 = number(needs_arg(rest, "interval")?, "interval")?;
            StatusInterval::from_secs(secs)
                .map(Intent::StatusInterval)
                .ok_or_else(|| ParseError(format!("{}s is not a supported interval", secs)))
        }
        "wifi" => Ok(Intent::Wifi(on_off(needs_arg(rest, "wifi")?)?)),
        "post" => PostMode::from_token(needs_arg(rest, "post")?)
            .map(Intent::PostMode)
            .ok_or_else(|| ParseError("post mode is time or lora".to_string())),
        "data" => Ok(Intent::Data(rest.to_string())),
        "flash" => Ok(Intent::Flash),
        "sync" => Ok(Intent::Sync),
        "state" => Ok(Intent::ShowState),
        "log" => match needs_arg(rest, "log")? {
            "short" => Ok(Intent::ShortLog(true)),
            "full" => Ok(Intent::ShortLog(false)),
            other => error(format!("expected short or full, got {:?}", other)),
        },
        "reconnect" => Ok(Intent::Reconnect),
        "help" | "?" => Ok(Intent::Help),
        "quit" | "exit" => Ok(Intent::Quit),
        "" => error("empty command"),
        other => error(format!("unknown command {:?}, type help", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_settings() {
        assert_eq!(parse("gain 10"), Ok(Intent::Gain(10)));
        assert_eq!(parse("gain -9"), Ok(Intent::Gain(-9)));
        assert_eq!(parse("freq 868.1"), Ok(Intent::Frequency(868.1)));
        assert_eq!(parse("sf 9"), Ok(Intent::SpreadingFactor(9)));
        assert_eq!(parse("bw 125"), Ok(Intent::Bandwidth(Bandwidth::Khz125)));
        assert_eq!(parse("bw 41.7"), Ok(Intent::Bandwidth(Bandwidth::Khz41_7)));
    }

    #[test]
    fn test_switches() {
        assert_eq!(parse("status on"), Ok(Intent::StatusEnabled(true)));
        assert_eq!(parse("status?"), Ok(Intent::RequestStatus));
        assert_eq!(parse("interval 60"), Ok(Intent::StatusInterval(StatusInterval::Secs60)));
        assert_eq!(parse("wifi off"), Ok(Intent::Wifi(false)));
        assert_eq!(parse("post lora"), Ok(Intent::PostMode(PostMode::OnReceive)));
        assert_eq!(parse("log short"), Ok(Intent::ShortLog(true)));
    }

    #[test]
    fn test_data_keeps_spacing() {
        assert_eq!(parse("data hello  mesh"), Ok(Intent::Data("hello  mesh".into())));
        assert_eq!(parse("  flash  "), Ok(Intent::Flash));
        assert_eq!(parse("quit"), Ok(Intent::Quit));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse("gain").is_err());
        assert!(parse("gain loud").is_err());
        assert!(parse("gain 300").is_err());
        assert!(parse("bw 100").is_err());
        assert!(parse("interval 45").is_err());
        assert!(parse("wifi maybe").is_err());
        assert!(parse("post never").is_err());
        assert!(parse("launch").is_err());
        assert!(parse("").is_err());
    }
}
