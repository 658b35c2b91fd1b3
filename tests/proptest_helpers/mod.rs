#![allow(dead_code)]

use recordprep::AnnotationRow;
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_class_name() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,7}"
}

/// A box inside a `width` x `height` image, edges included.
pub fn arb_box_within(width: u32, height: u32) -> impl Strategy<Value = (i64, i64, i64, i64)> {
    let (w, h) = (width as i64, height as i64);
    (0..=w, 0..=w, 0..=h, 0..=h).prop_map(|(x1, x2, y1, y2)| {
        (x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
    })
}

/// A row for one of `num_images` images. Each image index has a fixed size so
/// rows for the same filename agree on their declared dimensions.
pub fn arb_row(num_images: usize) -> impl Strategy<Value = AnnotationRow> {
    (0..num_images, arb_class_name()).prop_flat_map(|(image, class_name)| {
        let (width, height) = image_size(image);
        arb_box_within(width, height).prop_map(move |(xmin, ymin, xmax, ymax)| AnnotationRow {
            filename: format!("image_{image}.jpg"),
            width,
            height,
            class_name: class_name.clone(),
            xmin,
            ymin,
            xmax,
            ymax,
        })
    })
}

pub fn arb_rows(num_images: usize, max_rows: usize) -> impl Strategy<Value = Vec<AnnotationRow>> {
    prop::collection::vec(arb_row(num_images), 0..=max_rows)
}

pub fn image_size(image: usize) -> (u32, u32) {
    let image = image as u32;
    (64 + 32 * image, 48 + 16 * image)
}
