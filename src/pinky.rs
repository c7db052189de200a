//! Pinky & Brain chatter.
//!
//! Learn-type runs print a phrase now and then; `doom pinky` prints nothing
//! else until interrupted.

use crate::console::{Reporter, Tone};
use crate::interrupt::Interrupt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// First line printed once a learn run has sent its first probe
pub const PROBE_CONNECTED: &str = "🐰 Pinky connected the probe... again.";

/// Chatter phrases
pub const PHRASES: &[&str] = &[
    "🐰 Pinky connected the probe... again.",
    "🧠 Brain says: 'We're going to interrogate every SCPI bit tonight, Pinky.'",
    "🔬 Amplifying neural SCPI harmonics...",
    "🎯 Targeting :CHANnel1 mindspace...",
    "👾 Spawning Pinky subprocess...",
    "☠️ Found residue from a failed command rebellion...",
    "💣 DOOM mode activated. Sending in BFG9000...",
    "📡 Listening to Rigol dreams...",
    "🔗 Unlocking forbidden opcodes...",
    "🛠️ Rebuilding command reality brick by byte...",
    "🍕 Pinky paused for a pizza. Brain not amused...",
    "🧪 Synthesizing new SCPI molecules in the lab...",
    "🎮 Pinky accidentally set trigger mode to NIGHTMARE.",
    "📟 Trying :BUS4:RS232:PEND? while whistling the DOOM theme...",
    "🌀 Brain is calculating 12-dimensional SCPI vectors...",
    "🔐 Attempting to picklock :SYSTem:SECure?",
    "🐰 Pinky asked the scope politely. It responded with a beep.",
    "🧠 Brain is building a recursive command parser... with crayons.",
    "👣 Tracing SCPI breadcrumbs through the logic analyzer.",
];

/// Per-run chatter state
pub struct Chatter {
    probability: f64,
    announced: bool,
    rng: StdRng,
}

impl Chatter {
    /// Chatter with the given per-probe phrase probability
    pub fn new(probability: f64) -> Self {
        Self::with_rng(probability, StdRng::from_entropy())
    }

    /// Chatter with a fixed RNG
    pub fn with_rng(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            announced: false,
            rng,
        }
    }

    /// Called after each probe: announce once, then maybe a random phrase.
    pub fn after_probe(&mut self, reporter: &Reporter) {
        if !self.announced {
            self.announced = true;
            reporter.warn(PROBE_CONNECTED);
        } else if self.rng.gen_bool(self.probability) {
            if let Some(phrase) = PHRASES.choose(&mut self.rng) {
                reporter.warn(*phrase);
            }
        }
    }
}

/// Print random phrases in random colors until interrupted or `count` printed.
///
/// Returns the number of phrases printed.
pub async fn gehirnwaesche(reporter: &Reporter, interrupt: &Interrupt, count: Option<usize>) -> usize {
    let mut rng = StdRng::from_entropy();
    reporter.warn("🐰 Initiating Gehirnwäsche protocol with Pinky & Brain quotes...\n");

    let mut printed = 0;
    while count.map_or(true, |c| printed < c) {
        let pause = Duration::from_secs_f64(rng.gen_range(0.3..1.2));
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = interrupt.triggered() => {
                reporter.error("\n🧠 Brain override: Gehirnwäsche interrupted by user (Ctrl+C)");
                return printed;
            }
        }
        let phrase = PHRASES.choose(&mut rng).copied().unwrap_or(PROBE_CONNECTED);
        let tone = Tone::ALL.choose(&mut rng).copied().unwrap_or(Tone::Warn);
        reporter.line(tone, phrase);
        printed += 1;
    }
    printed
}
