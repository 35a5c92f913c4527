// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential token minting.
//!
//! Tokens are opaque random strings. They are not secrets in any
//! cryptographic sense; uniqueness is what matters, and the caller retries on
//! the (vanishingly rare) collision with an existing token.

use rand::RngCore;

#[derive(Debug, Clone, Copy)]
pub struct TokenGenerator {
	bytes: usize,
}

impl TokenGenerator {
	pub fn new(bytes: usize) -> Self {
		Self { bytes }
	}

	/// Lowercase hex of `bytes` random bytes.
	pub fn generate(&self) -> String {
		let mut buf = vec![0u8; self.bytes];
		rand::thread_rng().fill_bytes(&mut buf);
		hex::encode(buf)
	}

	/// Generate until `is_taken` accepts the token.
	pub fn generate_unique(&self, is_taken: impl Fn(&str) -> bool) -> String {
		loop {
			let token = self.generate();
			if !is_taken(&token) {
				return token;
			}
		}
	}
}

impl Default for TokenGenerator {
	fn default() -> Self {
		Self::new(tac_config::DEFAULT_TOKEN_BYTES)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;

	#[test]
	fn generates_hex_of_configured_length() {
		let token = TokenGenerator::new(8).generate();
		assert_eq!(token.len(), 16);
		assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn generate_unique_retries_until_free() {
		let attempts = Cell::new(0);
		let token = TokenGenerator::default().generate_unique(|_| {
			attempts.set(attempts.get() + 1);
			attempts.get() < 3
		});
		assert_eq!(attempts.get(), 3);
		assert_eq!(token.len(), tac_config::DEFAULT_TOKEN_BYTES * 2);
	}
}
