//! NIfTI and sidecar I/O
//!
//! Loads 4D acquisitions and 3D masks through the `nifti` crate and writes
//! result maps back with the source affine. Gzip is detected from the magic
//! bytes, not the file extension. Repetition time comes from the BIDS-style
//! JSON sidecar next to the image.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ndarray::{Array, Array3, ShapeBuilder};
use nifti::volume::ndarray::IntoNdArray;
use nifti::writer::WriterOptions;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};
use tracing::debug;

use crate::error::{QaError, QaResult};
use crate::mask::BrainMask;
use crate::snr::SnrMap;
use crate::volume::Volume4D;

/// Sidecar key holding the repetition time in seconds
pub const TR_KEY: &str = "RepetitionTime";

/// Decoded image in Fortran order with its spatial metadata
#[derive(Debug, Clone)]
pub struct NiftiData {
    pub data: Vec<f64>,
    /// (nx, ny, nz, nt); nt is 1 for 3D images
    pub dims: (usize, usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header fields for diagnostics when parsing fails
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("file too small ({} bytes, need at least 348)", bytes.len());
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn parse_object(bytes: &[u8]) -> QaResult<InMemNiftiObject> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let info = match std::io::Read::read_to_end(&mut decoder, &mut decompressed) {
                Ok(_) => get_header_info(&decompressed),
                Err(_) => "could not decompress".to_string(),
            };
            QaError::Nifti(format!("failed to read gzipped NIfTI: {} ({})", e, info))
        })
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes)).map_err(|e| {
            QaError::Nifti(format!("failed to read NIfTI: {} ({})", e, get_header_info(bytes)))
        })
    }
}

/// Decode a NIfTI image (3D or 4D) from bytes
pub fn load_nifti(bytes: &[u8]) -> QaResult<NiftiData> {
    let obj = parse_object(bytes)?;
    let header = obj.header();
    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| QaError::Nifti(format!("failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 || shape.len() > 4 {
        return Err(QaError::Nifti(format!(
            "expected a 3D or 4D image, got {}D",
            shape.len()
        )));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() == 4 { shape[3] } else { 1 };

    // index = x + y*nx + z*nx*ny + t*nx*ny*nz
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    if shape.len() == 3 {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(array[[i, j, k]]);
                }
            }
        }
    } else {
        for t in 0..nt {
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        data.push(array[[i, j, k, t]]);
                    }
                }
            }
        }
    }

    Ok(NiftiData { data, dims: (nx, ny, nz, nt), voxel_size, affine })
}

/// Voxel-to-world affine (row-major 4x4) of a loaded image
///
/// The sform rows are used when `sform_code` is set. Otherwise the affine is
/// a pure scaling by pixdim with zero translation; qform quaternions are not
/// decoded. Written maps always carry an sform, so a map read back reproduces
/// the affine of the volume it came from.
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    let mut affine = [0.0; 16];
    affine[15] = 1.0;
    if header.sform_code > 0 {
        for (row, srow) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
            for (col, &v) in srow.iter().enumerate() {
                affine[row * 4 + col] = v as f64;
            }
        }
    } else {
        for axis in 0..3 {
            affine[axis * 5] = header.pixdim[axis + 1] as f64;
        }
    }
    affine
}

/// Header carrying the affine and voxel size for a written map
fn map_header(voxel_size: (f64, f64, f64), affine: &[f64; 16]) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim = [
        1.0,
        voxel_size.0 as f32,
        voxel_size.1 as f32,
        voxel_size.2 as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    header.sform_code = 1;
    header.srow_x = [affine[0] as f32, affine[1] as f32, affine[2] as f32, affine[3] as f32];
    header.srow_y = [affine[4] as f32, affine[5] as f32, affine[6] as f32, affine[7] as f32];
    header.srow_z = [affine[8] as f32, affine[9] as f32, affine[10] as f32, affine[11] as f32];
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

fn read_bytes(path: &Path) -> QaResult<Vec<u8>> {
    fs::read(path).map_err(|e| QaError::Nifti(format!("failed to read '{}': {}", path.display(), e)))
}

/// Read a 4D acquisition from a .nii or .nii.gz file
pub fn read_volume(path: &Path) -> QaResult<Volume4D> {
    let nifti = load_nifti(&read_bytes(path)?)?;
    debug!(path = %path.display(), dims = ?nifti.dims, "loaded volume");
    Volume4D::new(nifti.data, nifti.dims, nifti.voxel_size, nifti.affine)
}

/// Read a 3D brain mask; any positive voxel is inside
pub fn read_mask(path: &Path) -> QaResult<BrainMask> {
    let nifti = load_nifti(&read_bytes(path)?)?;
    let (nx, ny, nz, nt) = nifti.dims;
    if nt != 1 {
        return Err(QaError::Nifti(format!(
            "mask '{}' has {} volumes, expected a 3D image",
            path.display(),
            nt
        )));
    }
    BrainMask::from_values(&nifti.data, (nx, ny, nz))
}

/// Write a 3D buffer as float32; `.nii.gz` paths are compressed
pub fn write_nifti_3d(
    path: &Path,
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> QaResult<()> {
    let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
    let array = Array3::from_shape_vec(dims.f(), values)
        .map_err(|e| QaError::Nifti(format!("map does not fit dims {:?}: {}", dims, e)))?;
    let header = map_header(voxel_size, affine);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| QaError::Nifti(format!("failed to write '{}': {}", path.display(), e)))?;
    debug!(path = %path.display(), "wrote map");
    Ok(())
}

/// Write an SNR map with its own affine
pub fn write_map(path: &Path, map: &SnrMap, voxel_size: (f64, f64, f64)) -> QaResult<()> {
    write_nifti_3d(path, &map.data, map.dims, voxel_size, &map.affine)
}

/// Write a brain mask as a 0/1 image
pub fn write_mask(
    path: &Path,
    mask: &BrainMask,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> QaResult<()> {
    write_nifti_3d(path, &mask.to_f64(), mask.dims(), voxel_size, affine)
}

/// Path of the JSON sidecar for an image (`x.nii.gz` -> `x.json`)
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_file_name(format!("{}.json", image_stem(image)))
}

/// File name without `.nii` or `.nii.gz`
pub fn image_stem(image: &Path) -> String {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(name.as_str())
        .to_string()
}

/// Repetition time from a sidecar's JSON text
///
/// A missing key is `None`; a key that is not a number is an error.
pub fn parse_sidecar_tr(contents: &str) -> QaResult<Option<f64>> {
    let value: serde_json::Value = serde_json::from_str(contents)
        .map_err(|e| QaError::Sidecar(format!("invalid JSON: {}", e)))?;
    match value.get(TR_KEY) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(tr) => tr
            .as_f64()
            .map(Some)
            .ok_or_else(|| QaError::Sidecar(format!("{} is not a number: {}", TR_KEY, tr))),
    }
}

/// Repetition time from the sidecar file, `None` if the file does not exist
pub fn read_sidecar_tr(path: &Path) -> QaResult<Option<f64>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    parse_sidecar_tr(&contents)
        .map_err(|e| QaError::Sidecar(format!("{}: {}", path.display(), e)))
}
