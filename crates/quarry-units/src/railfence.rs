//! Rail-fence cipher decoder.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use quarry_engine::{Case, Cases, Data, Error, Manager, Result, Target, Unit};
use tracing::trace;

use crate::{is_printable_text, min_data};

/// Rail counts swept when none is configured.
const RAIL_RANGE: std::ops::Range<usize> = 2..100;

/// Decrypts rail-fence ciphertext, one case per candidate rail count.
///
/// Strict flags: a decode is noisy, so a flag must be the entire plaintext.
/// Protected recurse: its own output is never fed back to it.
pub struct Railfence {
    target: Arc<Target>,
    rails: Option<usize>,
    seen: Mutex<HashSet<String>>,
}

impl Railfence {
    /// Offer a unit for `target` when its payload is printable text of a
    /// useful size. The `[railfence] rails` option pins a single rail count.
    pub fn applicable(manager: &Manager, target: &Arc<Target>) -> Option<Arc<dyn Unit>> {
        if !is_printable_text(target.payload()) {
            return None;
        }
        if target.payload().len() < min_data(manager) {
            return None;
        }
        let rails = manager
            .options()
            .get_int("railfence", "rails")
            .ok()
            .map(|n| n as usize)
            .filter(|n| RAIL_RANGE.contains(n));
        Some(Arc::new(Self {
            target: target.clone(),
            rails,
            seen: Mutex::new(HashSet::new()),
        }))
    }
}

impl Unit for Railfence {
    fn name(&self) -> &'static str {
        "railfence"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn strict_flags(&self) -> bool {
        true
    }

    fn protected_recurse(&self) -> bool {
        true
    }

    fn target(&self) -> &Arc<Target> {
        &self.target
    }

    fn enumerate(&self) -> Result<Cases> {
        let rails: Vec<usize> = match self.rails {
            Some(n) => vec![n],
            None => RAIL_RANGE.collect(),
        };
        Ok(Box::new(rails.into_iter().map(|n| Box::new(n) as Case)))
    }

    fn evaluate(self: Arc<Self>, manager: &Manager, case: Case) -> Result<()> {
        let rails = case
            .downcast::<usize>()
            .map_err(|_| Error::Unit("railfence: unexpected case type".into()))?;

        let cipher = std::str::from_utf8(self.target.payload())
            .map_err(|e| Error::Unit(format!("railfence: non-text target: {}", e)))?;
        let plaintext = decrypt_fence(cipher, *rails);

        if !self.seen.lock().insert(plaintext.clone()) {
            return Ok(());
        }
        trace!(rails = *rails, "railfence candidate");

        let unit: Arc<dyn Unit> = self.clone();
        manager.register_data(&unit, Data::Text(plaintext), true);
        Ok(())
    }
}

/// Undo a rail-fence transposition with the given number of rails.
fn decrypt_fence(cipher: &str, rails: usize) -> String {
    let chars: Vec<char> = cipher.chars().collect();
    let length = chars.len();
    if rails < 2 || length == 0 {
        return cipher.to_string();
    }

    // Lay the ciphertext back onto the fence rail by rail, stepping each
    // rail's zig-zag stride, then read it off column-wise.
    let mut fence = vec![vec![None; length]; rails];
    let mut i = 0;
    for rail in 0..rails {
        let mut down = rail != rails - 1;
        let mut x = rail;
        while x < length && i < length {
            fence[rail][x] = Some(chars[i]);
            // Top and bottom rails keep a constant stride; middle rails
            // alternate between the two.
            x += if down {
                2 * (rails - rail - 1)
            } else {
                2 * rail
            };
            if rail != 0 && rail != rails - 1 {
                down = !down;
            }
            i += 1;
        }
    }

    let mut plain = String::with_capacity(length);
    for col in 0..length {
        for row in &fence {
            if let Some(c) = row[col] {
                plain.push(c);
            }
        }
    }
    plain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_fence(plain: &str, rails: usize) -> String {
        let chars: Vec<char> = plain.chars().collect();
        let mut rows = vec![String::new(); rails];
        let mut rail = 0usize;
        let mut down = true;
        for c in chars {
            rows[rail].push(c);
            if rail == 0 {
                down = true;
            } else if rail == rails - 1 {
                down = false;
            }
            rail = if down { rail + 1 } else { rail - 1 };
        }
        rows.concat()
    }

    #[test]
    fn decrypts_the_classic_example() {
        assert_eq!(
            decrypt_fence("WECRLTEERDSOEEFEAOCAIVDEN", 3),
            "WEAREDISCOVEREDFLEEATONCE"
        );
    }

    #[test]
    fn round_trips_various_rail_counts() {
        let plain = "ATTACKATDAWNONTHEEASTRIDGE";
        for rails in 2..8 {
            let cipher = encrypt_fence(plain, rails);
            assert_eq!(decrypt_fence(&cipher, rails), plain, "rails={}", rails);
        }
    }

    #[test]
    fn excess_rails_degenerate_to_identity() {
        assert_eq!(decrypt_fence("SHORT", 50), "SHORT");
    }

    #[test]
    fn single_rail_is_identity() {
        assert_eq!(decrypt_fence("ANYTHING", 1), "ANYTHING");
    }
}
