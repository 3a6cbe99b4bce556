//! ASCII PLY import and export.
//!
//! Supported layout: `format ascii 1.0`, a single `vertex` element and any
//! non-empty subset of the scalar properties `x y z nx ny nz` (`float`) and
//! `red green blue` (`float` or `uchar`), in any order. `uchar` values are
//! scaled to [0, 1] on read. Missing properties keep their defaults: zero
//! position and normal, white color.
//!
//! Export always writes all nine properties.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Encoding, Header, Property, PropertyType, ScalarType};
use tracing::{debug, info};

use crate::error::{CloudError, CloudResult};
use crate::tracing_ext::log_io_operation;
use crate::types::{Cloud, Point};

const VERTEX_ELEMENT: &str = "vertex";

/// Vertex properties the reader understands.
pub const PROPERTY_NAMES: [&str; 9] = ["x", "y", "z", "nx", "ny", "nz", "red", "green", "blue"];

/// Parse an ASCII PLY stream into points.
///
/// `source_name` only labels errors. Nothing is returned unless the whole
/// stream parses. Blank header lines are skipped.
pub fn read_ply<R: Read>(reader: R, source_name: &str) -> CloudResult<Vec<Point>> {
    let mut reader = BufReader::new(reader);
    let header_text = read_header_text(&mut reader, source_name)?;
    let mut stream = header_text.as_bytes().chain(reader);
    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut stream)
        .map_err(|e| CloudError::format(source_name, format!("PLY parse error: {}", e)))?;

    let declared = validate_header(&ply.header, source_name)?;
    let vertices = ply
        .payload
        .get(VERTEX_ELEMENT)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if vertices.len() != declared {
        return Err(CloudError::format(
            source_name,
            format!("expected {} vertices, found {}", declared, vertices.len()),
        ));
    }

    let points: Vec<Point> = vertices.iter().map(vertex_to_point).collect();
    debug!(source = source_name, points = points.len(), "Parsed PLY");
    Ok(points)
}

/// Header lines up to and including `end_header`, without blank lines.
///
/// Property names must be unique within an element; the parser keys
/// properties by name and would silently drop a repeated column.
fn read_header_text<R: BufRead>(reader: &mut R, source_name: &str) -> CloudResult<String> {
    let mut header = String::new();
    let mut line = String::new();
    let mut element_properties: Vec<String> = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| CloudError::format(source_name, format!("unreadable header: {}", e)))?;
        if read == 0 {
            break;
        }
        let text = line.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            continue;
        }

        let mut words = text.split_whitespace();
        match words.next() {
            Some("element") => element_properties.clear(),
            Some("property") => {
                if let Some(name) = words.last() {
                    if element_properties.iter().any(|seen| seen == name) {
                        return Err(CloudError::format(
                            source_name,
                            format!("duplicate property '{}'", name),
                        ));
                    }
                    element_properties.push(name.to_string());
                }
            }
            _ => {}
        }

        header.push_str(text);
        header.push('\n');
        if text.trim() == "end_header" {
            break;
        }
    }
    Ok(header)
}

/// Check the header against the supported layout and return the vertex count.
fn validate_header(header: &Header, source_name: &str) -> CloudResult<usize> {
    let fail = |details: String| CloudError::format(source_name, details);

    if header.encoding != Encoding::Ascii {
        return Err(fail(format!("unsupported encoding {:?}", header.encoding)));
    }
    if header.version.major != 1 || header.version.minor != 0 {
        return Err(fail(format!(
            "unsupported version {}.{}",
            header.version.major, header.version.minor
        )));
    }
    if !header.obj_infos.is_empty() {
        return Err(fail("obj_info lines are not supported".to_string()));
    }
    if header.elements.len() != 1 {
        return Err(fail(format!(
            "expected exactly one element, found {}",
            header.elements.len()
        )));
    }

    let Some(element) = header.elements.values().next() else {
        return Err(fail("missing vertex element".to_string()));
    };
    if element.name != VERTEX_ELEMENT {
        return Err(fail(format!("unsupported element '{}'", element.name)));
    }
    if element.properties.is_empty() {
        return Err(fail("vertex element declares no properties".to_string()));
    }

    for property in element.properties.values() {
        if !PROPERTY_NAMES.contains(&property.name.as_str()) {
            return Err(fail(format!("unknown property '{}'", property.name)));
        }
        match property.data_type {
            PropertyType::Scalar(ScalarType::Float | ScalarType::UChar) => {}
            ref other => {
                return Err(fail(format!(
                    "property '{}' has unsupported type {:?}",
                    property.name, other
                )));
            }
        }
    }

    Ok(element.count)
}

fn vertex_to_point(vertex: &DefaultElement) -> Point {
    let mut point = Point::default();
    for (name, value) in vertex {
        let value = match *value {
            Property::Float(v) => f64::from(v),
            Property::UChar(v) => f64::from(v) / 255.0,
            _ => continue,
        };
        match name.as_str() {
            "x" => point.position.x = value,
            "y" => point.position.y = value,
            "z" => point.position.z = value,
            "nx" => point.normal.x = value,
            "ny" => point.normal.y = value,
            "nz" => point.normal.z = value,
            "red" => point.color.x = value,
            "green" => point.color.y = value,
            "blue" => point.color.z = value,
            _ => {}
        }
    }
    point
}

/// Write `points` as ASCII PLY with all nine properties.
///
/// Positions and normals are narrowed to `f32`; colors are scaled by 255 and
/// truncated.
pub fn write_ply<W: Write>(points: &[Point], writer: W) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", points.len())?;
    for axis in ["x", "y", "z", "nx", "ny", "nz"] {
        writeln!(writer, "property float {}", axis)?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(writer, "property uchar {}", channel)?;
    }
    writeln!(writer, "end_header")?;

    for point in points {
        let p = point.position;
        let n = point.normal;
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {}",
            p.x as f32,
            p.y as f32,
            p.z as f32,
            n.x as f32,
            n.y as f32,
            n.z as f32,
            color_byte(point.color.x),
            color_byte(point.color.y),
            color_byte(point.color.z),
        )?;
    }

    writer.flush()
}

#[inline]
fn color_byte(c: f64) -> u8 {
    (c * 255.0) as u8
}

impl Cloud {
    /// Load a cloud from an ASCII PLY file, named after the file stem.
    pub fn load(path: impl AsRef<Path>) -> CloudResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::load_named(path, name)
    }

    /// Load a cloud from an ASCII PLY file with an explicit name.
    pub fn load_named(path: impl AsRef<Path>, name: impl Into<String>) -> CloudResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CloudError::io_read(path, e))?;

        let result = read_ply(file, &path.display().to_string());
        log_io_operation(
            "load",
            path,
            result.as_ref().map_or(0, Vec::len),
            result.is_ok(),
        );
        let points = result?;

        let cloud = Self::with_points(name, points);
        info!(
            path = %path.display(),
            cloud = cloud.name(),
            points = cloud.len(),
            "Loaded point cloud"
        );
        Ok(cloud)
    }

    /// Store the cloud's points (in local coordinates) as ASCII PLY.
    pub fn store(&self, path: impl AsRef<Path>) -> CloudResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| CloudError::io_write(path, e))?;

        let result = write_ply(self.points(), file);
        log_io_operation("store", path, self.len(), result.is_ok());
        result.map_err(|e| CloudError::io_write(path, e))?;

        info!(
            path = %path.display(),
            cloud = self.name(),
            points = self.len(),
            "Stored point cloud"
        );
        Ok(())
    }
}
