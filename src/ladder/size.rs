//! Video frame sizes and the step-down rule used to build the ladder

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target heights of the ladder, descending
pub const STEP_HEIGHTS: [u32; 9] = [4320, 2160, 1440, 1080, 720, 480, 360, 240, 160];

/// How a scaled width is derived from a step height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Floor the scaled width and clear its lowest bit. Every step that is
    /// smaller than the current height produces a size. Minimum 160px.
    #[default]
    ClearLowBit,
    /// Only accept a step when the scaled width divides exactly and is even,
    /// otherwise try the next step. Minimum 145px.
    ExactDivision,
}

impl RoundingPolicy {
    /// Smallest width or height a derived size may have
    pub fn min_dimension(&self) -> u32 {
        match self {
            RoundingPolicy::ClearLowBit => 160,
            RoundingPolicy::ExactDivision => 145,
        }
    }
}

/// Integer frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is over `n`
    pub fn is_over(&self, n: u32) -> bool {
        self.width > n || self.height > n
    }

    /// Swap width and height
    pub fn reverse(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// ffmpeg scale filter for this size
    pub fn scale_filter(&self) -> String {
        format!("scale=w={}:h={}", self.width, self.height)
    }

    /// Next size down the ladder, or `None` when no step is both smaller
    /// and above the minimum dimension.
    ///
    /// Portrait sizes are handled by running the landscape rule on the
    /// swapped size and swapping the result back.
    pub fn smaller(&self, policy: RoundingPolicy) -> Option<VideoSize> {
        if self.width < self.height {
            return self.reverse().smaller(policy).map(|s| s.reverse());
        }
        if self.height == 0 {
            return None;
        }

        let min = policy.min_dimension();
        for &step in STEP_HEIGHTS.iter() {
            if self.height <= step {
                continue;
            }
            let scaled = self.width as u64 * step as u64;
            let width = match policy {
                RoundingPolicy::ClearLowBit => (scaled / self.height as u64) as u32 & !1,
                RoundingPolicy::ExactDivision => {
                    if scaled % self.height as u64 != 0 {
                        continue;
                    }
                    let width = (scaled / self.height as u64) as u32;
                    if width % 2 != 0 {
                        continue;
                    }
                    width
                }
            };
            if width < min || step < min {
                return None;
            }
            return Some(VideoSize::new(width, step));
        }
        None
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for VideoSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid size {s:?}, expected WIDTHxHEIGHT"))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width in {s:?}"))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height in {s:?}"))?;
        Ok(VideoSize::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(start: VideoSize, policy: RoundingPolicy) -> Vec<VideoSize> {
        let mut out = Vec::new();
        let mut cur = start;
        while let Some(next) = cur.smaller(policy) {
            out.push(next);
            cur = next;
        }
        out
    }

    fn sizes(list: &[(u32, u32)]) -> Vec<VideoSize> {
        list.iter().map(|&(w, h)| VideoSize::new(w, h)).collect()
    }

    #[test]
    fn test_non_standard_aspect_ratio() {
        let got = chain(VideoSize::new(3840, 1610), RoundingPolicy::ClearLowBit);
        assert_eq!(
            got,
            sizes(&[
                (3434, 1440),
                (2574, 1080),
                (1716, 720),
                (1144, 480),
                (858, 360),
                (572, 240),
                (380, 160),
            ])
        );
    }

    #[test]
    fn test_standard_16_9() {
        let got = chain(VideoSize::new(1920, 1080), RoundingPolicy::ClearLowBit);
        assert_eq!(
            got,
            sizes(&[(1280, 720), (852, 480), (638, 360), (424, 240), (282, 160)])
        );
    }

    #[test]
    fn test_4k() {
        let got = chain(VideoSize::new(3840, 2160), RoundingPolicy::ClearLowBit);
        assert_eq!(
            got,
            sizes(&[
                (2560, 1440),
                (1920, 1080),
                (1280, 720),
                (852, 480),
                (638, 360),
                (424, 240),
                (282, 160),
            ])
        );
    }

    #[test]
    fn test_portrait_is_swapped_landscape() {
        let portrait = chain(VideoSize::new(1080, 1920), RoundingPolicy::ClearLowBit);
        assert_eq!(
            portrait,
            sizes(&[(720, 1280), (480, 852), (360, 638), (240, 424), (160, 282)])
        );

        let landscape = chain(VideoSize::new(1920, 1080), RoundingPolicy::ClearLowBit);
        let swapped: Vec<_> = landscape.iter().map(|s| s.reverse()).collect();
        assert_eq!(portrait, swapped);
    }

    #[test]
    fn test_derived_sizes_are_even() {
        for start in [(3840, 1610), (2560, 1070), (1920, 803), (1279, 719), (999, 1777)] {
            let start = VideoSize::new(start.0, start.1);
            for s in chain(start, RoundingPolicy::ClearLowBit) {
                assert_eq!(s.width % 2, 0, "{start} -> {s}");
                assert_eq!(s.height % 2, 0, "{start} -> {s}");
            }
        }
    }

    #[test]
    fn test_aspect_ratio_preserved() {
        for (w, h) in [(3840, 1610), (2560, 1070), (1920, 803)] {
            let input = VideoSize::new(w, h);
            let next = input.smaller(RoundingPolicy::ClearLowBit).unwrap();
            let orig = w as f64 / h as f64;
            let ratio = next.width as f64 / next.height as f64;
            let diff = (ratio - orig) / orig;
            assert!(diff.abs() < 0.01, "{input} -> {next}: {diff}");
        }
    }

    #[test]
    fn test_degenerate_sizes_terminate() {
        assert_eq!(VideoSize::new(1, 1).smaller(RoundingPolicy::ClearLowBit), None);
        assert_eq!(VideoSize::new(0, 0).smaller(RoundingPolicy::ClearLowBit), None);
        assert_eq!(VideoSize::new(160, 160).smaller(RoundingPolicy::ClearLowBit), None);
        assert_eq!(
            VideoSize::new(170, 170).smaller(RoundingPolicy::ClearLowBit),
            Some(VideoSize::new(160, 160))
        );
    }

    #[test]
    fn test_exact_division_skips_inexact_steps() {
        // 1280*480/720 is not an integer, 1280*360/720 = 640
        let got = VideoSize::new(1920, 1080).smaller(RoundingPolicy::ExactDivision);
        assert_eq!(got, Some(VideoSize::new(1280, 720)));
        let got = VideoSize::new(1280, 720).smaller(RoundingPolicy::ExactDivision);
        assert_eq!(got, Some(VideoSize::new(640, 360)));

        let all = chain(VideoSize::new(1920, 1080), RoundingPolicy::ExactDivision);
        assert_eq!(all, sizes(&[(1280, 720), (640, 360)]));
    }

    #[test]
    fn test_parse_and_display() {
        let s: VideoSize = "1920x1080".parse().unwrap();
        assert_eq!(s, VideoSize::new(1920, 1080));
        assert_eq!(s.to_string(), "1920x1080");
        assert_eq!(s.scale_filter(), "scale=w=1920:h=1080");
        assert!("1920".parse::<VideoSize>().is_err());
    }
}
