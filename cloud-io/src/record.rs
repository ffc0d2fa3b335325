use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt as _, WriteBytesExt as _};
use glam::DVec3;

use cloud_core::pointcloud::cloud::PointCloud;
use cloud_core::pointcloud::visibility::Visibility;

use crate::error::RecordError;

/// Version written by `save_record`.
pub const RECORD_VERSION: u16 = 33;
/// Oldest version `load_record` accepts.
pub const MIN_VERSION: u16 = 20;
/// First version carrying the global scale alongside the shift.
const SHIFT_SCALE_VERSION: u16 = 33;
/// First version carrying the per-cloud point size.
const POINT_SIZE_VERSION: u16 = 24;

/// Writes the cloud's annotation record: version, reference frame,
/// optional visibility table, point size. Little-endian, fixed field
/// order.
pub fn save_record<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<(), RecordError> {
    writer.write_u16::<LittleEndian>(RECORD_VERSION)?;

    let shift = cloud.global_shift();
    writer.write_f64::<LittleEndian>(shift.x)?;
    writer.write_f64::<LittleEndian>(shift.y)?;
    writer.write_f64::<LittleEndian>(shift.z)?;
    writer.write_f64::<LittleEndian>(cloud.global_scale())?;

    match cloud.visibility() {
        Some(table) if table.is_allocated() => {
            writer.write_u8(1)?;
            write_code_array(writer, &table.snapshot())?;
        }
        _ => writer.write_u8(0)?,
    }

    writer.write_u8(cloud.point_size())?;
    Ok(())
}

/// Reads an annotation record into `cloud`.
///
/// Field presence is gated by the stored version: versions before 33
/// carry the shift but no scale (forced to 1.0), versions before 24 no
/// point size (defaults to 0), versions before 20 are rejected. The cloud
/// is only mutated after every field decoded, so a corrupt record leaves
/// it untouched.
pub fn load_record<R: Read>(reader: &mut R, cloud: &mut PointCloud) -> Result<(), RecordError> {
    let version = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    if version < MIN_VERSION {
        return Err(RecordError::UnsupportedVersion(version));
    }

    let shift = DVec3::new(
        reader.read_f64::<LittleEndian>().map_err(truncated)?,
        reader.read_f64::<LittleEndian>().map_err(truncated)?,
        reader.read_f64::<LittleEndian>().map_err(truncated)?,
    );
    let scale = if version >= SHIFT_SCALE_VERSION {
        reader.read_f64::<LittleEndian>().map_err(truncated)?
    } else {
        1.0
    };

    let codes = match reader.read_u8().map_err(truncated)? {
        0 => None,
        _ => Some(read_code_array(reader)?),
    };

    let point_size = if version >= POINT_SIZE_VERSION {
        reader.read_u8().map_err(truncated)?
    } else {
        0
    };

    cloud.set_global_shift(shift);
    cloud.set_global_scale(scale);
    match codes {
        Some(codes) => cloud.visibility_or_create().replace(codes),
        None => cloud.release_visibility(),
    }
    cloud.set_point_size(point_size);
    Ok(())
}

/// Shared length-prefixed layout for code arrays: `u32` count, then one
/// byte per code.
fn write_code_array<W: Write>(writer: &mut W, codes: &[Visibility]) -> Result<(), RecordError> {
    let count = u32::try_from(codes.len())
        .map_err(|_| RecordError::Corrupt("visibility array too long to serialize"))?;
    writer.write_u32::<LittleEndian>(count)?;
    for &code in codes {
        writer.write_u8(code.code())?;
    }
    Ok(())
}

fn read_code_array<R: Read>(reader: &mut R) -> Result<Vec<Visibility>, RecordError> {
    let count = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let mut raw = Vec::new();
    raw.try_reserve_exact(count)
        .map_err(|_| RecordError::Corrupt("visibility array does not fit in memory"))?;
    raw.resize(count, 0u8);
    reader.read_exact(&mut raw).map_err(truncated)?;

    raw.into_iter()
        .map(|code| {
            Visibility::from_code(code).ok_or(RecordError::Corrupt("unknown visibility code"))
        })
        .collect()
}

/// A short read means the record ends mid-field; that is corruption, not
/// an IO environment problem.
fn truncated(err: std::io::Error) -> RecordError {
    if err.kind() == ErrorKind::UnexpectedEof {
        RecordError::Corrupt("truncated record")
    } else {
        RecordError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use byteorder::{LittleEndian, WriteBytesExt as _};

    use cloud_core::pointcloud::store::VecPointStore;

    use super::*;

    fn cloud_with_points(count: usize) -> PointCloud {
        let points: Vec<[f64; 3]> = (0..count).map(|i| [i as f64, 0.0, 0.0]).collect();
        PointCloud::new(Arc::new(VecPointStore::from(points)))
    }

    /// Hand-built record at an arbitrary version, shift-only frame.
    fn legacy_record(version: u16, with_point_size: bool) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_u16::<LittleEndian>(version).unwrap();
        for shift in [1.0f64, 2.0, 3.0] {
            bytes.write_f64::<LittleEndian>(shift).unwrap();
        }
        bytes.write_u8(0).unwrap(); // no visibility table
        if with_point_size {
            bytes.write_u8(7).unwrap();
        }
        bytes
    }

    #[test]
    fn round_trip_preserves_everything() {
        let mut cloud = cloud_with_points(4);
        cloud.set_global_shift(DVec3::new(1.0, 2.0, 3.0));
        cloud.set_global_scale(2.0);
        cloud.set_point_size(5);
        cloud.reset_visibility().unwrap();
        cloud.visibility().unwrap().set(2, Visibility::Hidden);

        let mut bytes = Vec::new();
        save_record(&mut bytes, &cloud).unwrap();

        let mut restored = cloud_with_points(4);
        load_record(&mut Cursor::new(&bytes), &mut restored).unwrap();

        assert_eq!(restored.global_shift(), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(restored.global_scale(), 2.0);
        assert_eq!(restored.point_size(), 5);
        assert_eq!(
            restored.visibility().unwrap().snapshot(),
            cloud.visibility().unwrap().snapshot()
        );
    }

    #[test]
    fn file_round_trip() {
        let mut cloud = cloud_with_points(2);
        cloud.set_global_shift(DVec3::new(-10.0, 0.5, 4.0));
        cloud.reset_visibility().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        save_record(&mut file, &cloud).unwrap();

        let mut restored = cloud_with_points(2);
        let mut file = std::fs::File::open(&path).unwrap();
        load_record(&mut file, &mut restored).unwrap();
        assert_eq!(restored.global_shift(), DVec3::new(-10.0, 0.5, 4.0));
        assert!(restored.is_visibility_instantiated());
    }

    #[test]
    fn version_19_is_rejected() {
        let bytes = legacy_record(19, false);
        let mut cloud = cloud_with_points(1);
        assert!(matches!(
            load_record(&mut Cursor::new(&bytes), &mut cloud),
            Err(RecordError::UnsupportedVersion(19))
        ));
    }

    #[test]
    fn version_21_defaults_scale_and_point_size() {
        let bytes = legacy_record(21, false);
        let mut cloud = cloud_with_points(1);
        load_record(&mut Cursor::new(&bytes), &mut cloud).unwrap();
        assert_eq!(cloud.global_shift(), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.global_scale(), 1.0);
        assert_eq!(cloud.point_size(), 0);
    }

    #[test]
    fn version_25_reads_the_point_size() {
        let bytes = legacy_record(25, true);
        let mut cloud = cloud_with_points(1);
        load_record(&mut Cursor::new(&bytes), &mut cloud).unwrap();
        assert_eq!(cloud.point_size(), 7);
    }

    #[test]
    fn version_32_forces_scale_to_one() {
        // pre-33 records never stored a scale, whatever the writer thought
        let bytes = legacy_record(32, true);
        let mut cloud = cloud_with_points(1);
        cloud.set_global_scale(4.0);
        load_record(&mut Cursor::new(&bytes), &mut cloud).unwrap();
        assert_eq!(cloud.global_scale(), 1.0);
    }

    #[test]
    fn short_read_is_corrupt_and_leaves_the_cloud_untouched() {
        let mut cloud = cloud_with_points(4);
        cloud.set_global_shift(DVec3::new(1.0, 2.0, 3.0));
        cloud.reset_visibility().unwrap();
        let mut bytes = Vec::new();
        save_record(&mut bytes, &cloud).unwrap();
        bytes.truncate(bytes.len() - 3);

        let mut target = cloud_with_points(4);
        target.set_global_shift(DVec3::new(9.0, 9.0, 9.0));
        assert!(matches!(
            load_record(&mut Cursor::new(&bytes), &mut target),
            Err(RecordError::Corrupt(_))
        ));
        assert_eq!(target.global_shift(), DVec3::new(9.0, 9.0, 9.0));
        assert!(!target.is_visibility_instantiated());
    }

    #[test]
    fn unknown_visibility_code_is_corrupt() {
        let mut bytes = Vec::new();
        bytes.write_u16::<LittleEndian>(RECORD_VERSION).unwrap();
        for value in [0.0f64; 4] {
            bytes.write_f64::<LittleEndian>(value).unwrap();
        }
        bytes.write_u8(1).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u8(200).unwrap(); // not a visibility code
        bytes.write_u8(0).unwrap();

        let mut cloud = cloud_with_points(1);
        assert!(matches!(
            load_record(&mut Cursor::new(&bytes), &mut cloud),
            Err(RecordError::Corrupt("unknown visibility code"))
        ));
    }

    #[test]
    fn absent_table_loads_as_absent() {
        let source = cloud_with_points(2);
        let mut bytes = Vec::new();
        save_record(&mut bytes, &source).unwrap();

        // the target had a table; the record says there is none
        let mut target = cloud_with_points(2);
        target.reset_visibility().unwrap();
        load_record(&mut Cursor::new(&bytes), &mut target).unwrap();
        assert!(!target.is_visibility_instantiated());
    }
}
