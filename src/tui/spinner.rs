const DOT_FRAMES: &[char] = &['⣾', '⣽', '⣻', '⢿', '⡿', '⣟', '⣯', '⣷'];

pub fn frame(idx: usize) -> char {
    DOT_FRAMES[idx % DOT_FRAMES.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_braille() {
        for &ch in DOT_FRAMES {
            assert!(('\u{2800}'..='\u{28FF}').contains(&ch), "char {ch:?} not in Braille range");
        }
    }

    #[test]
    fn wraps_around() {
        assert_eq!(frame(0), frame(DOT_FRAMES.len()));
    }

    #[test]
    fn large_index_no_panic() {
        let _ = frame(usize::MAX);
    }
}
