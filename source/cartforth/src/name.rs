use core::{fmt, hash::Hasher as _};
use hash32::{FnvHasher, Hasher};

/// A dictionary word name, with a precomputed length and hash so that the
/// newest-first dictionary scan can reject most entries without a string
/// compare.
#[derive(Clone)]
pub struct Name {
    text: Box<str>,
    len_hash: LenHash,
}

impl Name {
    pub fn new(text: &str) -> Self {
        Self {
            len_hash: LenHash::from_str(text),
            text: text.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Compares against a token that has already been hashed.
    #[inline]
    pub fn matches(&self, other: &str, other_hash: LenHash) -> bool {
        // The hash may collide, so a match still needs the string compare.
        self.len_hash == other_hash && &*self.text == other
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.text, other.len_hash)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.text, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LenHash {
    // 24..32: 8-bit len, saturating at 255
    // 00..24: 24-bit FnvHash
    inner: u32,
}

impl LenHash {
    const HASH_MASK: u32 = 0x00FF_FFFF;
    const LEN_MASK: u32 = 0xFF00_0000;

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(s.as_bytes());
        let hash = hasher.finish32();
        let len = s.len().min(0xFF) as u32;
        Self {
            inner: (len << 24) | (hash & Self::HASH_MASK),
        }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        ((self.inner & Self::LEN_MASK) >> 24) as usize
    }
}

#[cfg(test)]
pub mod test {
    use super::{LenHash, Name};

    #[test]
    fn names() {
        const ITEMS: &[&str] = &["hello", "this", "is", "a", "very", "silly", "test", "0branch"];

        for txt in ITEMS {
            let name = Name::new(txt);
            assert!(name.matches(txt, LenHash::from_str(txt)));
            assert_eq!(name.as_str(), *txt);
            assert_eq!(LenHash::from_str(txt).len(), txt.len());
        }
        assert!(!Name::new("dup").matches("DUP", LenHash::from_str("DUP")));
        assert!(Name::new("dup") != Name::new("dup2"));
    }

    #[test]
    fn long_names_saturate_len() {
        let long = "x".repeat(300);
        assert_eq!(LenHash::from_str(&long).len(), 255);
        assert!(Name::new(&long).matches(&long, LenHash::from_str(&long)));
    }
}
