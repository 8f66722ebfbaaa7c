//! Phrase list for the "phrases" channel.

use rand::seq::SliceRandom;
use rand::Rng;

/// Shown before anything was generated.
pub const PLACEHOLDER: &str = "Press Generate";

pub const PHRASES: [&str; 50] = [
    "Fit as a Fiddle",
    "Flea Market",
    "Cup Of Joe",
    "Mountain Out of a Molehill",
    "A Busy Body",
    "Fool's Gold",
    "Heads Up",
    "Hard Pill to Swallow",
    "A Little from Column A, a Little from Column B",
    "Throw In the Towel",
    "Jig Is Up",
    "Short End of the Stick",
    "Close But No Cigar",
    "A Lot on One's Plate",
    "Like Father Like Son",
    "All Greek To Me",
    "No-Brainer",
    "Break The Ice",
    "Keep On Truckin'",
    "No Ifs, Ands, or Buts",
    "Burst Your Bubble",
    "Rain on Your Parade",
    "Tough It Out",
    "What Goes Up Must Come Down",
    "Jumping the Gun",
    "Quick On the Draw",
    "Wouldn't Harm a Fly",
    "Fight Fire With Fire",
    "Needle In a Haystack",
    "Right Off the Bat",
    "Cut The Mustard",
    "Playing For Keeps",
    "Head Over Heels",
    "Back To the Drawing Board",
    "My Cup of Tea",
    "A Day Late and a Dollar Short",
    "Drawing a Blank",
    "Top Drawer",
    "A Cold Day in July",
    "A Cold Fish",
    "A Hundred and Ten Percent",
    "On the Ropes",
    "A Hair's Breadth",
    "Go For Broke",
    "Jaws of Life",
    "Swinging For the Fences",
    "Greased Lightning",
    "Man of Few Words",
    "Eat My Hat",
    "A Leg Up",
];

/// Picks between one and six phrases at random; repeats are allowed.
pub fn generate() -> Vec<String> {
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(1..=6);
    (0..count)
        .filter_map(|_| PHRASES.choose(&mut rng))
        .map(|phrase| phrase.to_string())
        .collect()
}
