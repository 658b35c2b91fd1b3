#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// A 24-bit uncompressed BMP of the given size. Pixel data is zeroed; only
/// the header matters for dimension reads.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

/// Writes a BMP-encoded image under any file name; the extension is not
/// looked at when reading dimensions.
pub fn write_image(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write image file");
}

/// A VOC annotation document for `filename` with the given objects.
pub fn voc_xml(filename: &str, size: (u32, u32), objects: &[(&str, [i64; 4])]) -> String {
    let mut xml = String::new();
    xml.push_str("<annotation verified=\"yes\">\n");
    xml.push_str("  <folder>images</folder>\n");
    xml.push_str(&format!("  <filename>{filename}</filename>\n"));
    xml.push_str(&format!("  <path>{filename}</path>\n"));
    xml.push_str("  <source><database>Unknown</database></source>\n");
    xml.push_str(&format!(
        "  <size><width>{}</width><height>{}</height><depth>3</depth></size>\n",
        size.0, size.1
    ));
    xml.push_str("  <segmented>0</segmented>\n");
    for (name, [xmin, ymin, xmax, ymax]) in objects {
        xml.push_str("  <object>\n");
        xml.push_str(&format!("    <name>{name}</name>\n"));
        xml.push_str("    <pose>Unspecified</pose>\n");
        xml.push_str("    <truncated>0</truncated>\n");
        xml.push_str("    <difficult>0</difficult>\n");
        xml.push_str(&format!(
            "    <bndbox><xmin>{xmin}</xmin><ymin>{ymin}</ymin>\
             <xmax>{xmax}</xmax><ymax>{ymax}</ymax></bndbox>\n"
        ));
        xml.push_str("  </object>\n");
    }
    xml.push_str("</annotation>\n");
    xml
}

/// Writes `voc_xml(...)` to `dir/xml_name`.
pub fn write_voc_xml(
    dir: &Path,
    xml_name: &str,
    filename: &str,
    size: (u32, u32),
    objects: &[(&str, [i64; 4])],
) {
    fs::create_dir_all(dir).expect("create annotation dir");
    fs::write(dir.join(xml_name), voc_xml(filename, size, objects)).expect("write xml file");
}
