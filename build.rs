//! Build script for fwcheck
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! for `fwcheck --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
