/// `original_source` detects a "very old" (pre-Maxwell) GPU by parsing the
/// GL_RENDERER string for a model number and treating anything under 900
/// as very old (e.g. "GeForce GTX 880" -> 880). This crate implements the
/// same heuristic (see SPEC_FULL.md section 9.2): it's the detail available
/// before the codec is opened, which is when the preset/QP row must be
/// chosen.
pub fn is_very_old_gpu(gl_renderer: &str) -> bool {
    extract_model_number(gl_renderer)
        .map(|n| n < 900)
        .unwrap_or(false)
}

fn extract_model_number(renderer: &str) -> Option<u32> {
    let mut best: Option<u32> = None;
    let mut digits = String::new();

    let mut flush = |digits: &mut String, best: &mut Option<u32>| {
        if digits.len() >= 3 {
            if let Ok(n) = digits.parse::<u32>() {
                *best = Some(n);
            }
        }
        digits.clear();
    };

    for ch in renderer.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            flush(&mut digits, &mut best);
        }
    }
    flush(&mut digits, &mut best);

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_old_gpu_by_model_number() {
        assert!(is_very_old_gpu("GeForce GTX 880/PCIe/SSE2"));
        assert!(is_very_old_gpu("GeForce GT 730"));
    }

    #[test]
    fn modern_gpu_not_flagged() {
        assert!(!is_very_old_gpu("NVIDIA GeForce RTX 3080/PCIe/SSE2"));
        assert!(!is_very_old_gpu("NVIDIA GeForce GTX 1660"));
    }

    #[test]
    fn unparseable_renderer_defaults_to_not_old() {
        assert!(!is_very_old_gpu("llvmpipe"));
    }
}
