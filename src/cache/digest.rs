//! Cache-key derivation.
//!
//! Digests are the MD5 of the bit-packed boolean array (most significant bit
//! first, final byte zero-padded), hex encoded. This is the same packing numpy
//! uses for `packbits`, so folder names agree with caches written by the
//! Python descriptor pipeline for the same selection mask.

use md5::{Digest, Md5};

use crate::data::blocks::BlockSelection;
use crate::data::filter::FeatureFilter;

/// Pack booleans eight to a byte, first flag in the high bit.
pub fn pack_bits(flags: &[bool]) -> Vec<u8> {
    flags
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &on)| if on { byte | (0x80 >> i) } else { byte })
        })
        .collect()
}

fn digest_flags(flags: &[bool]) -> String {
    hex::encode(Md5::digest(pack_bits(flags)))
}

/// Cache namespace of a block selection: 32 lowercase hex characters.
pub fn selection_digest(selection: &BlockSelection) -> String {
    digest_flags(selection.flags())
}

/// Digest of a filter's membership mask; disambiguates normalization files.
pub fn filter_digest(filter: &FeatureFilter) -> String {
    digest_flags(&filter.membership_mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first_with_zero_padding() {
        assert_eq!(pack_bits(&[true]), vec![0x80]);
        assert_eq!(pack_bits(&[true, false, true, true]), vec![0xb0]);
        assert_eq!(pack_bits(&[true; 9]), vec![0xff, 0x80]);
        assert!(pack_bits(&[]).is_empty());
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            selection_digest(&BlockSelection::new(vec![true])),
            "8d39dd7eef115ea6975446ef4082951f"
        );
        assert_eq!(
            selection_digest(&BlockSelection::new(vec![true, false, true, true])),
            "ec655b6da8b9264a7c7c5e1a70642fa7"
        );
        assert_eq!(
            selection_digest(&BlockSelection::new(vec![true; 9])),
            "8a72eb04e26e12be58f5dee1e5280efd"
        );
    }

    #[test]
    fn single_bit_changes_the_digest() {
        let a = BlockSelection::new(vec![true, false, false, false]);
        let b = BlockSelection::new(vec![false, true, false, false]);
        assert_ne!(selection_digest(&a), selection_digest(&b));
        assert_eq!(selection_digest(&a), selection_digest(&a.clone()));
    }

    #[test]
    fn digest_is_folder_safe() {
        let d = selection_digest(&BlockSelection::all(21));
        assert_eq!(d.len(), 32);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn filter_digest_follows_membership() {
        let a = FeatureFilter::from_indices(vec![0, 2, 3]).unwrap();
        let b = FeatureFilter::from_mask(&[true, false, true, true]).unwrap();
        let c = FeatureFilter::from_indices(vec![0, 2]).unwrap();
        assert_eq!(filter_digest(&a), filter_digest(&b));
        assert_eq!(filter_digest(&a), "ec655b6da8b9264a7c7c5e1a70642fa7");
        assert_ne!(filter_digest(&a), filter_digest(&c));
    }
}
