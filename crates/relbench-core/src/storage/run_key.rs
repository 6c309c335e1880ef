use rand::rngs::OsRng;
use rand::Rng;

/// Upper-case letters and digits minus the look-alikes I, L, O, U, 0 and 1.
pub const RUN_KEY_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ23456789";
pub const RUN_KEY_LEN: usize = 12;

/// Draws every character independently from the OS entropy source.
pub fn allocate_run_key() -> String {
    let mut rng = OsRng;
    (0..RUN_KEY_LEN)
        .map(|_| RUN_KEY_ALPHABET[rng.gen_range(0..RUN_KEY_ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_run_key(key: &str) -> bool {
    key.len() == RUN_KEY_LEN && key.bytes().all(|b| RUN_KEY_ALPHABET.contains(&b))
}
