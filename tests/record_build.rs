//! Building training records from grouped annotation tables.

use recordprep::record::example::Example;
use recordprep::record::{
    read_tfrecord_examples, BuildOptions, ErrorPolicy, RecordSink, TfRecordWriter,
};
use recordprep::table::io_csv::from_table_csv_str;
use recordprep::{
    AnnotationRow, AnnotationTable, LabelMap, RecordBuilder, RecordprepError, TrainingRecord,
};

mod common;

fn airplane_row(filename: &str, bbox: (i64, i64, i64, i64)) -> AnnotationRow {
    AnnotationRow {
        filename: filename.to_string(),
        width: 256,
        height: 256,
        class_name: "airplane".to_string(),
        xmin: bbox.0,
        ymin: bbox.1,
        xmax: bbox.2,
        ymax: bbox.3,
    }
}

fn airplane_builder(images_dir: &std::path::Path) -> RecordBuilder {
    let label_map = LabelMap::new([("airplane", 1u32)]).expect("label map");
    RecordBuilder::new(images_dir, label_map)
}

fn build_by_name(
    builder: &RecordBuilder,
    table: &AnnotationTable,
) -> Vec<(String, TrainingRecord)> {
    table
        .group_by_filename()
        .iter()
        .map(|group| {
            let record = builder.build(group).expect("build record");
            (group.filename().to_string(), record)
        })
        .collect()
}

fn assert_common_fields(record: &TrainingRecord, filename: &str) {
    assert_eq!(record.height(), 256);
    assert_eq!(record.width(), 256);
    assert_eq!(record.filename(), filename.as_bytes());
    assert_eq!(record.source_id(), filename.as_bytes());
    assert_eq!(record.format(), b"jpg");
}

#[test]
fn one_airplane_per_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("tmp_airplane_image.jpg"), 256, 256);

    let table = AnnotationTable::new(vec![airplane_row(
        "tmp_airplane_image.jpg",
        (64, 64, 192, 192),
    )]);
    let records = build_by_name(&airplane_builder(temp.path()), &table);
    assert_eq!(records.len(), 1);

    let record = &records[0].1;
    assert_common_fields(record, "tmp_airplane_image.jpg");
    assert_eq!(record.bbox_xmin(), &[0.25f32]);
    assert_eq!(record.bbox_ymin(), &[0.25f32]);
    assert_eq!(record.bbox_xmax(), &[0.75f32]);
    assert_eq!(record.bbox_ymax(), &[0.75f32]);
    assert_eq!(record.class_text(), &[b"airplane".to_vec()]);
    assert_eq!(record.class_label(), &[1i64]);
}

#[test]
fn multiple_airplanes_per_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("tmp_airplane_image.jpg"), 256, 256);

    let table = AnnotationTable::new(vec![
        airplane_row("tmp_airplane_image.jpg", (64, 64, 192, 192)),
        airplane_row("tmp_airplane_image.jpg", (96, 96, 128, 128)),
    ]);
    let records = build_by_name(&airplane_builder(temp.path()), &table);
    assert_eq!(records.len(), 1);

    let record = &records[0].1;
    assert_common_fields(record, "tmp_airplane_image.jpg");
    assert_eq!(record.bbox_xmin(), &[0.25f32, 0.375]);
    assert_eq!(record.bbox_ymin(), &[0.25f32, 0.375]);
    assert_eq!(record.bbox_xmax(), &[0.75f32, 0.5]);
    assert_eq!(record.bbox_ymax(), &[0.75f32, 0.5]);
    assert_eq!(
        record.class_text(),
        &[b"airplane".to_vec(), b"airplane".to_vec()]
    );
    assert_eq!(record.class_label(), &[1i64, 1]);
}

#[test]
fn one_airplane_multiple_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("tmp_airplane_image_1.jpg"), 256, 256);
    common::write_image(&temp.path().join("tmp_airplane_image_2.jpg"), 256, 256);

    let table = AnnotationTable::new(vec![
        airplane_row("tmp_airplane_image_1.jpg", (64, 64, 192, 192)),
        airplane_row("tmp_airplane_image_2.jpg", (96, 96, 128, 128)),
    ]);
    let records = build_by_name(&airplane_builder(temp.path()), &table);
    assert_eq!(records.len(), 2);

    for (filename, record) in &records {
        assert_common_fields(record, filename);
        match filename.as_str() {
            "tmp_airplane_image_1.jpg" => {
                assert_eq!(record.bbox_xmin(), &[0.25f32]);
                assert_eq!(record.bbox_ymin(), &[0.25f32]);
                assert_eq!(record.bbox_xmax(), &[0.75f32]);
                assert_eq!(record.bbox_ymax(), &[0.75f32]);
            }
            "tmp_airplane_image_2.jpg" => {
                assert_eq!(record.bbox_xmin(), &[0.375f32]);
                assert_eq!(record.bbox_ymin(), &[0.375f32]);
                assert_eq!(record.bbox_xmax(), &[0.5f32]);
                assert_eq!(record.bbox_ymax(), &[0.5f32]);
            }
            other => panic!("unexpected group {other}"),
        }
        assert_eq!(record.class_text(), &[b"airplane".to_vec()]);
        assert_eq!(record.class_label(), &[1i64]);
    }
}

#[test]
fn multiple_airplanes_multiple_files_interleaved() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("tmp_airplane_image_1.jpg"), 256, 256);
    common::write_image(&temp.path().join("tmp_airplane_image_2.jpg"), 256, 256);

    // Rows for image 1 straddle the row for image 2.
    let table = AnnotationTable::new(vec![
        airplane_row("tmp_airplane_image_1.jpg", (64, 64, 192, 192)),
        airplane_row("tmp_airplane_image_2.jpg", (96, 96, 128, 128)),
        airplane_row("tmp_airplane_image_1.jpg", (32, 32, 96, 96)),
    ]);
    let records = build_by_name(&airplane_builder(temp.path()), &table);
    assert_eq!(records.len(), 2);

    let (name_one, one) = &records[0];
    assert_eq!(name_one, "tmp_airplane_image_1.jpg");
    assert_common_fields(one, name_one);
    assert_eq!(one.bbox_xmin(), &[0.25f32, 0.125]);
    assert_eq!(one.bbox_ymin(), &[0.25f32, 0.125]);
    assert_eq!(one.bbox_xmax(), &[0.75f32, 0.375]);
    assert_eq!(one.bbox_ymax(), &[0.75f32, 0.375]);
    assert_eq!(one.class_label(), &[1i64, 1]);

    let (name_two, two) = &records[1];
    assert_eq!(name_two, "tmp_airplane_image_2.jpg");
    assert_common_fields(two, name_two);
    assert_eq!(two.bbox_xmin(), &[0.375f32]);
    assert_eq!(two.bbox_xmax(), &[0.5f32]);
    assert_eq!(two.class_label(), &[1i64]);
}

#[test]
fn labels_follow_their_rows() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("street.JPEG"), 400, 200);

    let table = from_table_csv_str(
        "filename,width,height,class,xmin,ymin,xmax,ymax\n\
         street.JPEG,400,200,car,0,0,100,50\n\
         street.JPEG,400,200,person,200,100,300,200\n\
         street.JPEG,400,200,car,100,50,400,200\n",
    )
    .expect("parse table");
    let label_map = LabelMap::from_pbtxt_str(
        "item { id: 3 name: 'car' }\nitem { id: 1 name: 'person' }\n",
    )
    .expect("parse label map");

    let groups = table.group_by_filename();
    let record = RecordBuilder::new(temp.path(), label_map)
        .build(&groups[0])
        .expect("build record");

    assert_eq!(record.format(), b"jpeg");
    assert_eq!(record.num_objects(), 3);
    assert_eq!(
        record.class_text(),
        &[b"car".to_vec(), b"person".to_vec(), b"car".to_vec()]
    );
    assert_eq!(record.class_label(), &[3i64, 1, 3]);
    assert_eq!(record.bbox_xmin(), &[0.0f32, 0.5, 0.25]);
    assert_eq!(record.bbox_ymin(), &[0.0f32, 0.5, 0.25]);
    assert_eq!(record.bbox_xmax(), &[0.25f32, 0.75, 1.0]);
    assert_eq!(record.bbox_ymax(), &[0.25f32, 1.0, 1.0]);
}

#[test]
fn unmapped_class_is_not_dropped() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("a.jpg"), 256, 256);

    let mut row = airplane_row("a.jpg", (0, 0, 10, 10));
    row.class_name = "balloon".to_string();
    let groups = AnnotationTable::new(vec![row]).group_by_filename();

    let err = airplane_builder(temp.path()).build(&groups[0]).unwrap_err();
    assert!(matches!(err, RecordprepError::UnknownClass { .. }));
}

#[test]
fn records_roundtrip_through_tfrecord_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let images = temp.path().join("images");
    common::write_image(&images.join("one.jpg"), 256, 256);
    common::write_image(&images.join("two.png"), 128, 64);

    let table = AnnotationTable::new(vec![
        airplane_row("one.jpg", (64, 64, 192, 192)),
        airplane_row("two.png", (32, 16, 64, 32)),
        airplane_row("missing.jpg", (0, 0, 1, 1)),
    ]);
    let groups = table.group_by_filename();

    let builder = airplane_builder(&images).with_options(BuildOptions {
        error_policy: ErrorPolicy::CollectAll,
        ..Default::default()
    });

    let output = temp.path().join("train.record");
    let mut writer = TfRecordWriter::create(&output).expect("create writer");
    let summary = builder.write_all(&groups, &mut writer).expect("write records");
    writer.finish().expect("finish writer");

    assert_eq!(summary.written, 2);
    assert_eq!(summary.objects, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].filename, "missing.jpg");
    assert!(matches!(
        summary.failures[0].error,
        RecordprepError::ImageNotFound { .. }
    ));

    let examples = read_tfrecord_examples(&output).expect("read records");
    assert_eq!(examples.len(), 2);

    let bytes = |example: &Example, key: &str| {
        example
            .feature(key)
            .and_then(|f| f.as_bytes_list())
            .map(<[Vec<u8>]>::to_vec)
    };
    let floats = |example: &Example, key: &str| {
        example
            .feature(key)
            .and_then(|f| f.as_float_list())
            .map(<[f32]>::to_vec)
    };

    assert_eq!(
        bytes(&examples[0], "image/filename"),
        Some(vec![b"one.jpg".to_vec()])
    );
    assert_eq!(
        bytes(&examples[0], "image/encoded"),
        Some(vec![common::bmp_bytes(256, 256)])
    );
    assert_eq!(
        floats(&examples[0], "image/object/bbox/xmin"),
        Some(vec![0.25])
    );

    assert_eq!(
        bytes(&examples[1], "image/format"),
        Some(vec![b"png".to_vec()])
    );
    assert_eq!(
        floats(&examples[1], "image/object/bbox/ymax"),
        Some(vec![0.5])
    );
}

#[test]
fn fail_fast_stops_at_first_bad_image() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("later.jpg"), 256, 256);

    let table = AnnotationTable::new(vec![
        airplane_row("first_missing.jpg", (0, 0, 1, 1)),
        airplane_row("later.jpg", (0, 0, 1, 1)),
    ]);
    let groups = table.group_by_filename();

    let mut sink: Vec<TrainingRecord> = Vec::new();
    let err = airplane_builder(temp.path())
        .write_all(&groups, &mut sink)
        .unwrap_err();
    assert!(matches!(err, RecordprepError::ImageNotFound { .. }));
    assert!(sink.is_empty());
}

#[test]
fn in_memory_sink_collects_records() {
    let temp = tempfile::tempdir().expect("create temp dir");
    common::write_image(&temp.path().join("a.jpg"), 256, 256);

    let groups =
        AnnotationTable::new(vec![airplane_row("a.jpg", (64, 64, 192, 192))]).group_by_filename();
    let builder = airplane_builder(temp.path());

    let mut sink: Vec<TrainingRecord> = Vec::new();
    sink.write_record(&builder.build(&groups[0]).expect("build"))
        .expect("write record");
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].image_bytes(), common::bmp_bytes(256, 256).as_slice());
}
