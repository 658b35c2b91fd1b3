//! Per-image training records.
//!
//! [`RecordBuilder`] turns one [`AnnotationGroup`] into one [`TrainingRecord`]:
//! it reads the image named by the group, takes width and height from the
//! image itself, and divides every box by those dimensions. The boxes and
//! class lists of a record are index-aligned with the group's rows.
//!
//! Records are encoded as `tf.train.Example` ([`example`]) and written through
//! a [`RecordSink`], normally a [`TfRecordWriter`].

pub mod example;
pub mod tfrecord;

pub use tfrecord::{read_tfrecord_examples, RecordSink, TfRecordReader, TfRecordWriter};

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use self::example::{Example, Feature, Features};
use crate::error::RecordprepError;
use crate::label_map::LabelMap;
use crate::table::AnnotationGroup;

/// One training example: an image plus its normalized, labelled boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingRecord {
    height: u32,
    width: u32,
    filename: Vec<u8>,
    source_id: Vec<u8>,
    image_bytes: Vec<u8>,
    format: Vec<u8>,
    bbox_xmin: Vec<f32>,
    bbox_ymin: Vec<f32>,
    bbox_xmax: Vec<f32>,
    bbox_ymax: Vec<f32>,
    class_text: Vec<Vec<u8>>,
    class_label: Vec<i64>,
}

impl TrainingRecord {
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    pub fn source_id(&self) -> &[u8] {
        &self.source_id
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    /// Lower-cased file extension, e.g. `jpg`.
    pub fn format(&self) -> &[u8] {
        &self.format
    }

    pub fn bbox_xmin(&self) -> &[f32] {
        &self.bbox_xmin
    }

    pub fn bbox_ymin(&self) -> &[f32] {
        &self.bbox_ymin
    }

    pub fn bbox_xmax(&self) -> &[f32] {
        &self.bbox_xmax
    }

    pub fn bbox_ymax(&self) -> &[f32] {
        &self.bbox_ymax
    }

    pub fn class_text(&self) -> &[Vec<u8>] {
        &self.class_text
    }

    pub fn class_label(&self) -> &[i64] {
        &self.class_label
    }

    /// Number of objects; the length of every per-object list.
    pub fn num_objects(&self) -> usize {
        self.class_label.len()
    }

    /// Converts the record into a `tf.train.Example` with the feature keys
    /// the TensorFlow Object Detection API reads.
    pub fn to_example(&self) -> Example {
        let mut feature = std::collections::BTreeMap::new();
        let mut put = |key: &str, value: Feature| {
            feature.insert(key.to_string(), value);
        };

        put("image/height", Feature::int64s([i64::from(self.height)]));
        put("image/width", Feature::int64s([i64::from(self.width)]));
        put("image/filename", Feature::bytes([self.filename.clone()]));
        put("image/source_id", Feature::bytes([self.source_id.clone()]));
        put("image/encoded", Feature::bytes([self.image_bytes.clone()]));
        put("image/format", Feature::bytes([self.format.clone()]));
        put(
            "image/object/bbox/xmin",
            Feature::floats(self.bbox_xmin.iter().copied()),
        );
        put(
            "image/object/bbox/xmax",
            Feature::floats(self.bbox_xmax.iter().copied()),
        );
        put(
            "image/object/bbox/ymin",
            Feature::floats(self.bbox_ymin.iter().copied()),
        );
        put(
            "image/object/bbox/ymax",
            Feature::floats(self.bbox_ymax.iter().copied()),
        );
        put(
            "image/object/class/text",
            Feature::bytes(self.class_text.iter().cloned()),
        );
        put(
            "image/object/class/label",
            Feature::int64s(self.class_label.iter().copied()),
        );

        Example {
            features: Some(Features { feature }),
        }
    }
}

/// What a batch build does when one image fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first failing image and return its error.
    #[default]
    FailFast,
    /// Record the failure, keep building the remaining images.
    CollectAll,
}

/// Options for [`RecordBuilder`].
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub error_policy: ErrorPolicy,
    /// Log a warning when the table's declared size differs from the image.
    pub check_declared_dims: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::FailFast,
            check_declared_dims: true,
        }
    }
}

/// An image that could not be turned into a record.
#[derive(Debug)]
pub struct BuildFailure {
    pub filename: String,
    pub error: RecordprepError,
}

/// Records built in memory by [`RecordBuilder::build_all`].
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub records: Vec<TrainingRecord>,
    pub failures: Vec<BuildFailure>,
}

/// Counts from [`RecordBuilder::write_all`].
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub written: usize,
    pub objects: usize,
    pub failures: Vec<BuildFailure>,
}

/// Builds training records from annotation groups.
///
/// The label map is fixed at construction so the same builder can be used
/// for every group of a dataset.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    images_dir: PathBuf,
    label_map: LabelMap,
    options: BuildOptions,
}

impl RecordBuilder {
    pub fn new(images_dir: impl Into<PathBuf>, label_map: LabelMap) -> Self {
        Self {
            images_dir: images_dir.into(),
            label_map,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Builds the record for a single group.
    ///
    /// # Errors
    /// - [`RecordprepError::MissingExtension`] if the filename has no extension
    /// - [`RecordprepError::UnsafeImagePath`] if the filename escapes the images directory
    /// - [`RecordprepError::ImageNotFound`] if the image is absent
    /// - [`RecordprepError::ImageDecode`] if its size cannot be read
    /// - [`RecordprepError::UnknownClass`] if a class is not in the label map
    pub fn build(&self, group: &AnnotationGroup) -> Result<TrainingRecord, RecordprepError> {
        let filename = group.filename();
        let format = image_format(filename)?;

        let image_path = image_path(&self.images_dir, filename)?;
        let image_bytes = read_image(&image_path)?;
        let (width, height) = image_dimensions(&image_bytes, &image_path)?;

        if self.options.check_declared_dims {
            let (declared_w, declared_h) = group.declared_size();
            if (declared_w, declared_h) != (width, height) {
                warn!(
                    "{}: annotation declares {}x{} but image is {}x{}; normalizing by the image",
                    filename, declared_w, declared_h, width, height
                );
            }
        }

        let n = group.len();
        let mut record = TrainingRecord {
            height,
            width,
            filename: filename.as_bytes().to_vec(),
            source_id: filename.as_bytes().to_vec(),
            image_bytes,
            format: format.into_bytes(),
            bbox_xmin: Vec::with_capacity(n),
            bbox_ymin: Vec::with_capacity(n),
            bbox_xmax: Vec::with_capacity(n),
            bbox_ymax: Vec::with_capacity(n),
            class_text: Vec::with_capacity(n),
            class_label: Vec::with_capacity(n),
        };

        for row in group.rows() {
            let label = self.label_map.get(&row.class_name).ok_or_else(|| {
                RecordprepError::UnknownClass {
                    class_name: row.class_name.clone(),
                    filename: filename.to_string(),
                }
            })?;

            let bbox = row.bbox().to_normalized(width as f64, height as f64);
            record.bbox_xmin.push(bbox.xmin() as f32);
            record.bbox_ymin.push(bbox.ymin() as f32);
            record.bbox_xmax.push(bbox.xmax() as f32);
            record.bbox_ymax.push(bbox.ymax() as f32);
            record.class_text.push(row.class_name.as_bytes().to_vec());
            record.class_label.push(i64::from(label));
        }

        debug!("{}: built record with {} object(s)", filename, n);
        Ok(record)
    }

    /// Builds every group in memory.
    ///
    /// With [`ErrorPolicy::FailFast`] the first failure is returned as `Err`.
    /// With [`ErrorPolicy::CollectAll`] failures are listed in the outcome.
    pub fn build_all(&self, groups: &[AnnotationGroup]) -> Result<BuildOutcome, RecordprepError> {
        let mut outcome = BuildOutcome::default();
        for group in groups {
            match self.build(group) {
                Ok(record) => outcome.records.push(record),
                Err(error) => self.handle_failure(group, error, &mut outcome.failures)?,
            }
        }
        Ok(outcome)
    }

    /// Builds every group and hands each record to `sink` as soon as it is
    /// ready, so only one image is held in memory at a time.
    pub fn write_all<S: RecordSink + ?Sized>(
        &self,
        groups: &[AnnotationGroup],
        sink: &mut S,
    ) -> Result<WriteSummary, RecordprepError> {
        let mut summary = WriteSummary::default();
        for group in groups {
            match self.build(group) {
                Ok(record) => {
                    sink.write_record(&record)?;
                    summary.written += 1;
                    summary.objects += record.num_objects();
                }
                Err(error) => self.handle_failure(group, error, &mut summary.failures)?,
            }
        }
        Ok(summary)
    }

    fn handle_failure(
        &self,
        group: &AnnotationGroup,
        error: RecordprepError,
        failures: &mut Vec<BuildFailure>,
    ) -> Result<(), RecordprepError> {
        match self.options.error_policy {
            ErrorPolicy::FailFast => Err(error),
            ErrorPolicy::CollectAll => {
                warn!("skipping {}: {}", group.filename(), error);
                failures.push(BuildFailure {
                    filename: group.filename().to_string(),
                    error,
                });
                Ok(())
            }
        }
    }
}

/// Returns the lower-cased extension of `filename` without the dot.
pub fn image_format(filename: &str) -> Result<String, RecordprepError> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| RecordprepError::MissingExtension {
            filename: filename.to_string(),
        })
}

/// Joins `filename` onto `images_dir`. See [`check_image_filename`].
pub fn image_path(images_dir: &Path, filename: &str) -> Result<PathBuf, RecordprepError> {
    check_image_filename(filename)?;
    Ok(images_dir.join(filename))
}

/// Accepts only relative names that stay inside the images directory:
/// no root, no prefix, no `..`, and at least one name component.
pub fn check_image_filename(filename: &str) -> Result<(), RecordprepError> {
    let unsafe_path = || RecordprepError::UnsafeImagePath {
        filename: filename.to_string(),
    };

    let mut has_name = false;
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            _ => return Err(unsafe_path()),
        }
    }
    if !has_name {
        return Err(unsafe_path());
    }
    Ok(())
}

/// Permutes group order deterministically for `seed`. Rows inside each
/// group are untouched.
pub fn shuffle_groups(groups: &mut [AnnotationGroup], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    groups.shuffle(&mut rng);
}

fn read_image(path: &Path) -> Result<Vec<u8>, RecordprepError> {
    fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => RecordprepError::ImageNotFound {
            path: path.to_path_buf(),
        },
        _ => RecordprepError::Io(source),
    })
}

fn image_dimensions(bytes: &[u8], path: &Path) -> Result<(u32, u32), RecordprepError> {
    let corrupted = || RecordprepError::ImageDecode {
        path: path.to_path_buf(),
        source: imagesize::ImageError::CorruptedImage,
    };

    let size = imagesize::blob_size(bytes).map_err(|source| RecordprepError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;

    let width: u32 = size.width.try_into().map_err(|_| corrupted())?;
    let height: u32 = size.height.try_into().map_err(|_| corrupted())?;
    if width == 0 || height == 0 {
        return Err(corrupted());
    }

    Ok((width, height))
}
