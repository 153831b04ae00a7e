use rand::Rng;

pub const DEFAULT_PREFIX: &str = "WHITE";
pub const BLOCKS: usize = 3;
pub const BLOCK_LEN: usize = 4;
const MAX_PREFIX_LEN: usize = 16;
const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, thiserror::Error)]
#[error("invalid key prefix '{0}': expected 1-16 characters from A-Z and 0-9")]
pub struct InvalidPrefix(pub String);

/// Produces `PREFIX-XXXX-XXXX-XXXX` ids. Uniqueness is the store's job.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl IdGenerator {
    pub fn new(prefix: &str) -> Result<Self, InvalidPrefix> {
        if !is_valid_prefix(prefix) {
            return Err(InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(self.prefix.len() + BLOCKS * (BLOCK_LEN + 1));
        id.push_str(&self.prefix);
        for _ in 0..BLOCKS {
            id.push('-');
            for _ in 0..BLOCK_LEN {
                id.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
        }
        id
    }
}

fn is_block_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit()
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.len() <= MAX_PREFIX_LEN && prefix.chars().all(is_block_char)
}

/// Whether `id` has the `PREFIX-XXXX-XXXX-XXXX` shape, for any valid prefix.
pub fn is_well_formed(id: &str) -> bool {
    let mut parts = id.split('-');
    let Some(prefix) = parts.next() else {
        return false;
    };
    if !is_valid_prefix(prefix) {
        return false;
    }
    let blocks: Vec<&str> = parts.collect();
    blocks.len() == BLOCKS
        && blocks
            .iter()
            .all(|b| b.len() == BLOCK_LEN && b.chars().all(is_block_char))
}

/// Canonical form of a user-typed id: trimmed and uppercased.
pub fn normalize(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}
