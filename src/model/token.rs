use crate::codec::CodecError;
use std::fmt;
use std::str::FromStr;

/// The instrument carried by an `INST=` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Program(u32),
    Drums,
}

/// One vocabulary token of the sequence grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    PieceStart,
    PieceEnd,
    TrackStart,
    TrackEnd,
    Inst(Instrument),
    Density(usize),
    BarStart,
    BarEnd,
    NoteOn(i32),
    NoteOff(i32),
    /// Time advance in sixteenth-note units.
    TimeDelta(f64),

    /// Stands in for the events of the bar selected for bar fill.
    FillPlaceholder,
    FillStart,
    FillEnd,

    /// Tokenizer padding/unknown markers and any other `FILL*` marker. Carried through untouched.
    Special(String),
}

impl Token {
    pub fn note_on(pitch: i32, transposition: i32) -> Self {
        Token::NoteOn(pitch + transposition)
    }

    pub fn note_off(pitch: i32, transposition: i32) -> Self {
        Token::NoteOff(pitch + transposition)
    }
}

/// Parses a delta payload, either decimal (`1.5`) or a simple fraction (`1/3`).
pub fn parse_delta(text: &str) -> Option<f64> {
    let value = match text.split_once('/') {
        Some((num, denom)) => {
            let num: i64 = num.trim().parse().ok()?;
            let denom: i64 = denom.trim().parse().ok()?;
            if denom == 0 {
                return None;
            }
            num as f64 / denom as f64
        }
        None => text.trim().parse::<f64>().ok()?,
    };

    value.is_finite().then_some(value)
}

/// Finest subdivision of a sixteenth the importer produces (keeps triplets exact).
const DELTA_GRID: i64 = 12;

/// Renders a delta so that it parses back to the same value. Grid values that are not
/// binary decimals (triplets, sextuplets) print as a reduced fraction like `4/3`;
/// integral values keep a trailing `.0`.
pub fn format_delta(delta: f64) -> String {
    let scaled = delta * DELTA_GRID as f64;
    let steps = scaled.round();

    if delta.is_finite() && delta.abs() < 1e12 && (scaled - steps).abs() < 1e-9 * scaled.abs().max(1.0) {
        let steps = steps as i64;
        let divisor = gcd(steps.abs(), DELTA_GRID).max(1);
        let (num, den) = (steps / divisor, DELTA_GRID / divisor);

        // 3 does not divide these, so the decimal form is exact
        if den % 3 != 0 {
            let value = num as f64 / den as f64;
            return if den == 1 {
                format!("{:.1}", value)
            } else {
                format!("{}", value)
            };
        }
        return format!("{}/{}", num, den);
    }

    if delta.fract() == 0.0 {
        format!("{:.1}", delta)
    } else {
        format!("{}", delta)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::PieceStart => f.write_str("PIECE_START"),
            Token::PieceEnd => f.write_str("PIECE_END"),
            Token::TrackStart => f.write_str("TRACK_START"),
            Token::TrackEnd => f.write_str("TRACK_END"),
            Token::Inst(Instrument::Program(p)) => write!(f, "INST={}", p),
            Token::Inst(Instrument::Drums) => f.write_str("INST=DRUMS"),
            Token::Density(d) => write!(f, "DENSITY={}", d),
            Token::BarStart => f.write_str("BAR_START"),
            Token::BarEnd => f.write_str("BAR_END"),
            Token::NoteOn(p) => write!(f, "NOTE_ON={}", p),
            Token::NoteOff(p) => write!(f, "NOTE_OFF={}", p),
            Token::TimeDelta(d) => write!(f, "TIME_DELTA={}", format_delta(*d)),
            Token::FillPlaceholder => f.write_str("FILL_PLACEHOLDER"),
            Token::FillStart => f.write_str("FILL_START"),
            Token::FillEnd => f.write_str("FILL_END"),
            Token::Special(s) => f.write_str(s),
        }
    }
}

impl FromStr for Token {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CodecError::MalformedToken {
            token: s.to_string(),
        };

        let token = match s {
            "PIECE_START" => Token::PieceStart,
            "PIECE_END" => Token::PieceEnd,
            "TRACK_START" => Token::TrackStart,
            "TRACK_END" => Token::TrackEnd,
            "BAR_START" => Token::BarStart,
            "BAR_END" => Token::BarEnd,
            "FILL_PLACEHOLDER" => Token::FillPlaceholder,
            "FILL_START" => Token::FillStart,
            "FILL_END" => Token::FillEnd,
            "[PAD]" | "[UNK]" => Token::Special(s.to_string()),
            _ if s.starts_with("FILL") => Token::Special(s.to_string()),
            _ => {
                let Some((prefix, payload)) = s.split_once('=') else {
                    return Err(CodecError::UnexpectedToken {
                        token: s.to_string(),
                    });
                };

                match prefix {
                    "INST" if payload == "DRUMS" => Token::Inst(Instrument::Drums),
                    "INST" => Token::Inst(Instrument::Program(
                        payload.parse().map_err(|_| malformed())?,
                    )),
                    "DENSITY" => Token::Density(payload.parse().map_err(|_| malformed())?),
                    "NOTE_ON" => Token::NoteOn(payload.parse().map_err(|_| malformed())?),
                    "NOTE_OFF" => Token::NoteOff(payload.parse().map_err(|_| malformed())?),
                    "TIME_DELTA" => Token::TimeDelta(parse_delta(payload).ok_or_else(malformed)?),
                    _ => {
                        return Err(CodecError::UnexpectedToken {
                            token: s.to_string(),
                        });
                    }
                }
            }
        };

        Ok(token)
    }
}

/// A flat token list for one training example or priming prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenSequence(pub Vec<Token>);

impl TokenSequence {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, token: Token) {
        self.0.push(token);
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Token strings in order, as consumed by the vocabulary layer.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(Token::to_string).collect()
    }
}

impl Extend<Token> for TokenSequence {
    fn extend<I: IntoIterator<Item = Token>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl fmt::Display for TokenSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

impl FromStr for TokenSequence {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<Token>, _>>()
            .map(TokenSequence)
    }
}
