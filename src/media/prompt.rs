//! Deterministic avatar prompts.
//!
//! A 32 character hex hash is read as a row of dials: each of the first
//! fifteen characters picks one trait from a small vocabulary, and eight
//! characters near the end become the sampler seed. The mapping never
//! consults anything but the hash, so a hash always describes the same
//! picture.

use crate::error::{CdnError, Result};

/// Length of an avatar hash in hex characters.
pub const HASH_LEN: usize = 32;

/// A dial selects one of four words by the hex nibble range its character
/// falls in: 0-3, 4-7, 8-b, c-f.
type Quad = [&'static str; 4];

const HAIR_COLOR: Quad = ["blonde", "brown hair", "red hair", "black hair"];
const STYLE_LORA: Quad = ["<lora:cdi:1>", "breath of the wild", "genshin impact", "arknights"];
const DETAIL: Quad = ["highly detailed", "ornate", "thick lines", "3d render"];
const HAIR_LENGTH: Quad = ["short hair", "long hair", "ponytail", "pigtails"];
const EXPRESSION: Quad = ["smile", "frown", "laughing", "angry"];
const OUTFIT: Quad = ["sweater", "tshirt", "suitjacket", "armor"];
const EYE_COLOR: Quad = ["blue eyes", "red eyes", "brown eyes", "hazel eyes"];
const TIME_OF_DAY: Quad = ["morning", "afternoon", "evening", "nighttime"];
const STUDIO: Quad = ["vtuber", "anime", "studio ghibli", "cloverworks"];

// == Avatar Prompt ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarPrompt {
    pub prompt: String,
    pub seed: u32,
}

/// Checks that `hash` is exactly 32 lowercase hex characters.
pub fn validate_hash(hash: &str) -> Result<()> {
    if hash.len() != HASH_LEN {
        return Err(CdnError::Validation(format!(
            "avatar hash must be {} characters, got {}",
            HASH_LEN,
            hash.len()
        )));
    }
    if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(CdnError::Validation(
            "avatar hash must be lowercase hexadecimal".to_string(),
        ));
    }
    Ok(())
}

// == Derive Prompt ==
/// Maps a validated hash to its prompt and seed.
pub fn derive_prompt(hash: &str) -> Result<AvatarPrompt> {
    validate_hash(hash)?;
    let h = hash.as_bytes();
    let mut prompt = String::new();

    push(&mut prompt, split(h[0], "1girl", "1guy"));
    push(&mut prompt, quad(h[1], &HAIR_COLOR));
    push(&mut prompt, split(h[2], "coffee shop", "landscape, outdoors"));
    push(&mut prompt, split(h[3], "hoodie", "sweatsuit"));
    push(&mut prompt, quad(h[4], &STYLE_LORA));
    push(&mut prompt, split(h[5], "watercolor", "matte painting"));
    push(&mut prompt, quad(h[6], &DETAIL));
    push(&mut prompt, quad(h[7], &HAIR_LENGTH));
    push(&mut prompt, quad(h[8], &EXPRESSION));
    push(&mut prompt, quad(h[9], &OUTFIT));
    push(&mut prompt, quad(h[10], &EYE_COLOR));
    if h[11] == b'0' {
        push(&mut prompt, "heterochromia");
    }
    push(&mut prompt, quad(h[12], &TIME_OF_DAY));
    if h[13] == b'0' {
        push(&mut prompt, "<lora:genshin:1>, genshin");
    }
    push(&mut prompt, quad(h[14], &STUDIO));
    prompt.push_str("pants");

    Ok(AvatarPrompt {
        prompt,
        seed: seed_for(hash),
    })
}

/// The eight hex characters before the final one, read as an unsigned seed.
fn seed_for(hash: &str) -> u32 {
    let window = &hash[hash.len() - 9..hash.len() - 1];
    // unreachable for validated hashes; kept for callers that skip validation
    u32::from_str_radix(window, 16).unwrap_or_else(|_| rand::random())
}

/// Characters 1-5 choose `low`, everything else `high`.
fn split(c: u8, low: &'static str, high: &'static str) -> &'static str {
    if (b'1'..=b'5').contains(&c) {
        low
    } else {
        high
    }
}

fn quad(c: u8, words: &Quad) -> &'static str {
    let nibble = match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => 0,
    };
    words[usize::from(nibble / 4)]
}

fn push(prompt: &mut String, words: &str) {
    prompt.push_str(words);
    prompt.push_str(", ");
}
