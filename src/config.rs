// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

mod audio;
pub mod error;

pub use self::audio::{Audio, StreamBufferSize};
pub use self::error::ConfigError;

/// Prefix for environment overrides, e.g. `JOVE_AUDIO_SAMPLE_RATE=48000`.
const ENV_PREFIX: &str = "JOVE_AUDIO";

/// Loads the audio configuration from an optional YAML file layered under
/// `JOVE_AUDIO_*` environment variables.
pub fn load(path: Option<&Path>) -> Result<Audio, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        debug!(path = ?path, "Loading audio configuration");
        builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
    }
    Ok(builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?
        .try_deserialize::<Audio>()?)
}

/// Parses an audio configuration from a YAML string.
pub fn parse(yaml: &str) -> Result<Audio, ConfigError> {
    Ok(Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?
        .try_deserialize::<Audio>()?)
}
