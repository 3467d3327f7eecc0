use crate::models::assets::{
    DDS_EXT, LOC_DEF_SOUND_SUFFIX, TEXTURE_EXT, WAV_EXT, has_suffix_ignore_case,
    strip_suffix_ignore_case,
};
use crate::models::{LogicalFolder, SoundRole};
use crate::services::PipelineContext;
use crate::services::fs_ops;
use crate::services::gateway::{ProcessRunner, StarterCommand, ToolError, ToolRunner};
use crate::services::layout::{self, LayoutError};
use crate::services::report::{ItemError, ItemFailure};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("no input files given")]
    NoInputs,

    #[error("external tool is unavailable: {0}")]
    ToolUnavailable(#[source] ToolError),

    #[error(transparent)]
    Workspace(#[from] LayoutError),
}

/// Outcome of a conversion batch. Failed files never stop their siblings.
#[derive(Debug, Default)]
pub struct ConversionReport {
    /// Converted files at their final location, in input order.
    pub outputs: Vec<Utf8PathBuf>,
    pub failures: Vec<ItemFailure>,
    /// Inputs left untouched after cancellation.
    pub skipped: Vec<Utf8PathBuf>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    TextureToDds,
    DdsToTexture,
    WavToSound(SoundRole),
}

impl Conversion {
    fn input_ext(self) -> &'static str {
        match self {
            Conversion::TextureToDds => TEXTURE_EXT,
            Conversion::DdsToTexture => DDS_EXT,
            Conversion::WavToSound(_) => WAV_EXT,
        }
    }

    fn output_ext(self) -> &'static str {
        match self {
            Conversion::TextureToDds => DDS_EXT,
            Conversion::DdsToTexture => TEXTURE_EXT,
            Conversion::WavToSound(_) => LOC_DEF_SOUND_SUFFIX,
        }
    }

    fn destination(self) -> LogicalFolder {
        match self {
            Conversion::TextureToDds => LogicalFolder::DdsWork,
            Conversion::DdsToTexture => LogicalFolder::PreparedTextures,
            Conversion::WavToSound(SoundRole::Sfx) => LogicalFolder::PreparedSoundsSfx,
            Conversion::WavToSound(SoundRole::Speech) => LogicalFolder::PreparedSoundsSpeech,
        }
    }

    fn tool_command(self) -> &'static str {
        match self {
            Conversion::TextureToDds => "atf2dds",
            Conversion::DdsToTexture => "dds2atf",
            Conversion::WavToSound(_) => "wav2aaf",
        }
    }

    fn command(self, source: Utf8PathBuf, target: Utf8PathBuf) -> StarterCommand {
        match self {
            Conversion::TextureToDds => StarterCommand::Atf2Dds { source, target },
            Conversion::DdsToTexture => StarterCommand::Dds2Atf { source, target },
            Conversion::WavToSound(_) => StarterCommand::Wav2Aaf { source, target },
        }
    }
}

/// Converts user-selected files one at a time through `starter.exe`.
///
/// Output lands in a scratch directory under the game's work area first and is moved
/// into the project only once the tool succeeded and the file exists.
pub struct AssetConverter<R = ProcessRunner> {
    ctx: PipelineContext<R>,
}

impl<R: ToolRunner> AssetConverter<R> {
    pub fn new(ctx: PipelineContext<R>) -> Self {
        Self { ctx }
    }

    /// `.texture` files to `.dds` in `dds_work/` for editing.
    pub async fn texture_to_dds(
        &self,
        inputs: &[Utf8PathBuf],
    ) -> Result<ConversionReport, ConversionError> {
        self.convert_all(inputs, Conversion::TextureToDds).await
    }

    /// Edited `.dds` files back to `.texture` in `prepared_textures/`.
    pub async fn dds_to_texture(
        &self,
        inputs: &[Utf8PathBuf],
    ) -> Result<ConversionReport, ConversionError> {
        self.convert_all(inputs, Conversion::DdsToTexture).await
    }

    /// `.wav` files to `.loc_def.sound` in `prepared_sounds/sfx/` or `prepared_sounds/speech/`.
    ///
    /// Sample rate and channel layout are whatever the tool accepts; its failure is reported as is.
    pub async fn wav_to_sound(
        &self,
        inputs: &[Utf8PathBuf],
        role: SoundRole,
    ) -> Result<ConversionReport, ConversionError> {
        self.convert_all(inputs, Conversion::WavToSound(role)).await
    }

    async fn convert_all(
        &self,
        inputs: &[Utf8PathBuf],
        conversion: Conversion,
    ) -> Result<ConversionReport, ConversionError> {
        if inputs.is_empty() {
            return Err(ConversionError::NoInputs);
        }

        let destination = self.ctx.paths.folder(conversion.destination());
        layout::ensure_dir(&destination)?;
        layout::ensure_game_workdir(&self.ctx.paths)?;

        tracing::info!(
            "Converting {} file(s) from {} to {} into {}",
            inputs.len(),
            conversion.input_ext(),
            conversion.output_ext(),
            destination
        );

        let mut report = ConversionReport::default();
        for (index, input) in inputs.iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                for rest in &inputs[index..] {
                    self.ctx.record_skipped(rest.as_str());
                    report.skipped.push(rest.clone());
                }
                break;
            }

            self.ctx.state.set_current_item(input.as_str());
            match self.convert_one(input, conversion, &destination).await {
                Ok(output) => {
                    self.ctx
                        .record_success(input.as_str(), format!("converted to {}", output));
                    report.outputs.push(output);
                }
                Err(ItemError::Tool(error)) if error.is_unreachable() => {
                    tracing::error!("Aborting conversion: {}", error);
                    return Err(ConversionError::ToolUnavailable(error));
                }
                Err(error) => {
                    self.ctx.record_failure(input.as_str(), &error);
                    report.failures.push(ItemFailure::new(input.as_str(), error));
                }
            }
        }

        tracing::info!(
            "Conversion finished: {}/{} successful, files in {}",
            report.outputs.len(),
            inputs.len(),
            destination
        );
        Ok(report)
    }

    async fn convert_one(
        &self,
        input: &Utf8Path,
        conversion: Conversion,
        destination: &Utf8Path,
    ) -> Result<Utf8PathBuf, ItemError> {
        if !input.is_file() {
            return Err(ItemError::MissingInput);
        }
        let name = input.file_name().unwrap_or(input.as_str());
        let stem = strip_suffix_ignore_case(name, conversion.input_ext()).ok_or(
            ItemError::UnexpectedExtension {
                expected: conversion.input_ext(),
            },
        )?;
        let output_name = format!("{}{}", stem, conversion.output_ext());

        let scratch =
            fs_ops::unique_scratch_dir(&self.ctx.paths.game_modwork(), "_temp", conversion.tool_command());
        std::fs::create_dir_all(&scratch).map_err(|e| ItemError::io(scratch.as_path(), e))?;

        let result = self
            .run_into_place(input, conversion, &scratch.join(&output_name), &destination.join(&output_name))
            .await;
        fs_ops::remove_dir_logged(&scratch);
        result
    }

    async fn run_into_place(
        &self,
        input: &Utf8Path,
        conversion: Conversion,
        scratch_output: &Utf8Path,
        final_output: &Utf8Path,
    ) -> Result<Utf8PathBuf, ItemError> {
        let command = conversion.command(input.to_path_buf(), scratch_output.to_path_buf());
        self.ctx.gateway.run_starter(&self.ctx.paths, &command).await?;

        fs_ops::move_into_place(scratch_output, final_output)
            .map_err(|e| ItemError::io(final_output, e))?;
        tracing::debug!("Moved {} to {}", scratch_output, final_output);
        Ok(final_output.to_path_buf())
    }
}

/// Whether `path` has the extension a conversion from `ext` expects.
pub fn accepts_input(path: &Utf8Path, ext: &str) -> bool {
    path.file_name()
        .is_some_and(|name| has_suffix_ignore_case(name, ext))
}
