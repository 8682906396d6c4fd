use anyhow::Result;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, builder::SessionBuilder, RunOptions, Session},
    value::DynValue,
};
use std::collections::HashMap;

use crate::{Device, LisaError};

/// Arena shrinkage spec handed to the runtime when a cache release is pending.
fn shrinkage_spec(device: Device) -> String {
    match device {
        Device::Cpu(_) => "cpu:0".to_string(),
        Device::Cuda(i) => format!("cpu:0;gpu:{}", i),
    }
}

/// ONNX Runtime session with its device fixed at construction.
#[derive(Debug)]
pub struct Model {
    session: Session,
    device: Device,
    input_names: Vec<String>,
    output_names: Vec<String>,
    release_pending: bool,
}

impl Model {
    pub fn new(model_path: &str, device: Device) -> Result<Self> {
        let builder = SessionBuilder::new()?;
        let builder = if device.is_cuda() {
            builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device.id() as _)
                .build()])?
        } else {
            builder
        };

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .map_err(|e| LisaError::collaborator(format!("Failed to load {model_path}: {e}")))?;

        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();

        Ok(Self {
            session,
            device,
            input_names,
            output_names,
            release_pending: false,
        })
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input_names.iter().any(|x| x == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output_names.iter().any(|x| x == name)
    }

    /// Returns cached arena memory to the device on the next run.
    pub fn release_cache(&mut self) {
        self.release_pending = true;
    }

    pub fn run(&mut self, tensors: Vec<(&str, DynValue)>) -> Result<HashMap<String, DynValue>> {
        for (name, _) in tensors.iter() {
            if !self.has_input(name) {
                return Err(LisaError::collaborator(format!(
                    "Model has no input named `{}`. Inputs: {:?}",
                    name, self.input_names
                ))
                .into());
            }
        }
        let inputs: HashMap<&str, DynValue> = tensors.into_iter().collect();

        let options = if self.release_pending {
            self.release_pending = false;
            let mut options = RunOptions::new()?;
            options.add_config_entry(
                "memory.enable_memory_arena_shrinkage",
                &shrinkage_spec(self.device),
            )?;
            Some(options)
        } else {
            None
        };
        let outputs = match &options {
            Some(options) => self.session.run_with_options(inputs, options),
            None => self.session.run(inputs),
        }
        .map_err(|e| LisaError::collaborator(format!("Inference failed: {e}")))?;

        Ok(outputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }

    pub fn summary(&self) {
        log::debug!(
            "Model on {}: inputs {:?}, outputs {:?}",
            self.device,
            self.input_names,
            self.output_names
        );
    }
}
