// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection-head checkpoint in safetensors format
//!
//! Parameter names follow the PyTorch state dict of the trained model
//! (`conv.weight`, `transformer.encoder.layers.0.self_attn.in_proj_weight`,
//! `query_pos`, ...). Entries under `backbone.` must match the ResNet-50
//! trunk layout exactly but their values are not used: the trunk runs from
//! its own ONNX export, which has to be produced from the same checkpoint.

use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backbone::resnet50_trunk_shapes;
use crate::vision::errors::DetectorError;

const BACKBONE_PREFIX: &str = "backbone.";

/// Parameters read from a checkpoint, consumed as the model is built
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    tensors: HashMap<String, ArrayD<f32>>,
}

impl Checkpoint {
    /// Read every head tensor from a safetensors file, validating the trunk entries
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DetectorError::CheckpointNotFound(path.to_path_buf()));
        }

        info!("Loading checkpoint from {}", path.display());

        let bytes = std::fs::read(path).map_err(|e| DetectorError::Checkpoint {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let safetensors =
            SafeTensors::deserialize(&bytes).map_err(|e| DetectorError::Checkpoint {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut tensors = HashMap::new();
        let mut trunk = BTreeMap::new();
        for (name, view) in safetensors.tensors() {
            if name.starts_with(BACKBONE_PREFIX) {
                trunk.insert(name, view.shape().to_vec());
                continue;
            }
            let array = tensor_to_array(&name, &view)?;
            tensors.insert(name, array);
        }

        let trunk_tensors = validate_trunk(&trunk)?;
        if trunk_tensors > 0 {
            warn!(
                "Checkpoint carries {} trunk tensors that are not applied; \
                 the ONNX backbone must be exported from this checkpoint",
                trunk_tensors
            );
        }

        debug!("Checkpoint holds {} head tensors", tensors.len());

        Ok(Self {
            path: path.to_path_buf(),
            tensors,
        })
    }

    /// Wrap in-memory parameters
    pub fn from_tensors(tensors: HashMap<String, ArrayD<f32>>) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            tensors,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a parameter, checking its shape exactly
    pub fn take(&mut self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, DetectorError> {
        let array = self
            .tensors
            .remove(name)
            .ok_or_else(|| DetectorError::MissingParameter(name.to_string()))?;

        if array.shape() != shape {
            return Err(DetectorError::ParameterShape {
                name: name.to_string(),
                expected: shape.to_vec(),
                found: array.shape().to_vec(),
            });
        }

        Ok(array)
    }

    pub fn take_1d(&mut self, name: &str, len: usize) -> Result<Array1<f32>, DetectorError> {
        Ok(self.take(name, &[len])?.into_dimensionality::<Ix1>()?)
    }

    pub fn take_2d(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<Array2<f32>, DetectorError> {
        Ok(self.take(name, &[rows, cols])?.into_dimensionality::<Ix2>()?)
    }

    /// Fail if any parameter was not claimed by the model
    pub fn finish(self) -> Result<(), DetectorError> {
        let mut leftover: Vec<String> = self.tensors.into_keys().collect();
        leftover.sort();
        match leftover.into_iter().next() {
            Some(name) => Err(DetectorError::UnexpectedParameter(name)),
            None => Ok(()),
        }
    }
}

/// Check `backbone.*` entries against the ResNet-50 trunk
///
/// A checkpoint may omit the trunk entirely. If any trunk tensor is present,
/// all of them must be, each with its exact shape. Returns the number found.
pub fn validate_trunk(found: &BTreeMap<String, Vec<usize>>) -> Result<usize, DetectorError> {
    if found.is_empty() {
        return Ok(0);
    }

    let expected: HashMap<String, Vec<usize>> = resnet50_trunk_shapes().into_iter().collect();

    for (name, shape) in found {
        let want = expected
            .get(name)
            .ok_or_else(|| DetectorError::UnexpectedParameter(name.clone()))?;
        if want != shape {
            return Err(DetectorError::ParameterShape {
                name: name.clone(),
                expected: want.clone(),
                found: shape.clone(),
            });
        }
    }

    let mut missing: Vec<&String> = expected
        .keys()
        .filter(|name| !found.contains_key(*name))
        .collect();
    missing.sort();
    match missing.first() {
        Some(name) => Err(DetectorError::MissingParameter((*name).clone())),
        None => Ok(found.len()),
    }
}

fn tensor_to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>, DetectorError> {
    if view.dtype() != Dtype::F32 {
        return Err(DetectorError::UnsupportedDtype {
            name: name.to_string(),
            dtype: format!("{:?}", view.dtype()),
        });
    }

    let values: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(view.shape()), values)?)
}

/// Write parameters to a safetensors file
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    tensors: &BTreeMap<String, ArrayD<f32>>,
) -> Result<(), DetectorError> {
    let path = path.as_ref();
    let checkpoint_error = |message: String| DetectorError::Checkpoint {
        path: path.to_path_buf(),
        message,
    };

    let encoded: Vec<(&String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, array)| {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name, array.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(encoded.len());
    for (name, shape, bytes) in &encoded {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| checkpoint_error(e.to_string()))?;
        views.push((name.as_str(), view));
    }

    let serialized =
        safetensors::serialize(views, &None).map_err(|e| checkpoint_error(e.to_string()))?;
    std::fs::write(path, serialized).map_err(|e| checkpoint_error(e.to_string()))?;

    debug!("Wrote {} tensors to {}", tensors.len(), path.display());
    Ok(())
}
