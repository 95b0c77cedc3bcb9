//! Session tokens. Per the Design Notes (§9) these are indexed by their raw
//! bytes, not by a lower-case hex string — the reference's hex index was
//! incidental and doubles memory for no benefit once we control the hash map
//! key type directly.

use rand::RngCore;
use rand::rngs::OsRng;

pub const TOKEN_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub [u8; TOKEN_LEN]);

impl Token {
    /// Draws a token from a CSPRNG, retrying on the astronomically unlikely
    /// all-zero/all-one edge case so a degenerate token can never be issued.
    pub fn generate() -> Self {
        loop {
            let mut bytes = [0u8; TOKEN_LEN];
            OsRng.fill_bytes(&mut bytes);
            if bytes.iter().any(|b| *b != 0x00) && bytes.iter().any(|b| *b != 0xFF) {
                return Token(bytes);
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the full token; a short prefix is enough to correlate
        // log lines without leaking a credential into the log stream.
        write!(f, "Token({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_not_degenerate() {
        for _ in 0..1000 {
            let token = Token::generate();
            assert!(token.0.iter().any(|b| *b != 0));
            assert!(token.0.iter().any(|b| *b != 0xFF));
        }
    }

    #[test]
    fn tokens_are_statistically_uniform() {
        // Counts set bits over many samples; a biased RNG would skew far
        // from the expected ~50% density.
        let mut ones = 0u64;
        let samples = 256;
        for _ in 0..samples {
            let token = Token::generate();
            ones += token.0.iter().map(|b| b.count_ones() as u64).sum::<u64>();
        }
        let total_bits = samples * TOKEN_LEN as u64 * 8;
        let ratio = ones as f64 / total_bits as f64;
        assert!((0.45..0.55).contains(&ratio), "bit density {ratio} looks biased");
    }

    #[test]
    fn distinct_tokens_are_generated() {
        let a = Token::generate();
        let b = Token::generate();
        assert_ne!(a.0, b.0);
    }
}
