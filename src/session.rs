use anyhow::Result;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::Path;

use crate::{
    decode_output, say, tokenize_image_prompt, Annotator, ConversationBuilder, DataLoader, LisaInputs,
    Options, Processor, PromptRegistry, PromptTemplate, RenderedMask, SamplePair, Segmenter,
    TokenizerTrait,
};

/// Counters for one pass over a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pairs: usize,
    pub processed: usize,
    pub skipped: usize,
    pub masks_written: usize,
    pub empty_masks: usize,
}

/// Drives the segmenter over every discovered pair, one at a time.
pub struct Session<S: Segmenter> {
    segmenter: S,
    tokenizer: Box<dyn TokenizerTrait>,
    processor: Processor,
    conversation: ConversationBuilder,
    prompt: PromptTemplate,
    annotator: Annotator,
    options: Options,
}

impl<S: Segmenter> Session<S> {
    pub fn new(segmenter: S, tokenizer: Box<dyn TokenizerTrait>, options: Options) -> Result<Self> {
        Self::with_registry(segmenter, tokenizer, options, &PromptRegistry::builtin())
    }

    pub fn with_registry(
        segmenter: S,
        tokenizer: Box<dyn TokenizerTrait>,
        options: Options,
        registry: &PromptRegistry,
    ) -> Result<Self> {
        let prompt = *registry.get(options.prompt_number)?;
        let processor = options.to_processor()?;
        let conversation = options.to_conversation();

        Ok(Self {
            segmenter,
            tokenizer,
            processor,
            conversation,
            prompt,
            annotator: Annotator::new(prompt.id),
            options,
        })
    }

    pub fn segmenter(&self) -> &S {
        &self.segmenter
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    pub fn process_folder<P: AsRef<Path>>(&mut self, root: P) -> Result<RunSummary> {
        let dataloader = DataLoader::new(root)?.with_progress_bar(self.options.progress_bar);
        let mut summary = RunSummary {
            pairs: dataloader.len(),
            ..Default::default()
        };
        println!("Total pairs collected: {}", summary.pairs);
        println!("Prompt: {}", self.prompt.text);

        // Identical for every sample.
        let prompt = self.conversation.build(self.prompt.text)?;
        let input_ids = tokenize_image_prompt(self.tokenizer.as_ref(), &prompt)?;
        if input_ids.len() as u64 > self.options.model_max_length {
            log::warn!(
                "Prompt is {} tokens, longer than model_max_length {}",
                input_ids.len(),
                self.options.model_max_length
            );
        }

        let mut pairs = dataloader.into_iter();
        while let Some(pair) = pairs.next() {
            self.process_pair(&pair, &input_ids, pairs.progress_bar(), &mut summary)?;
        }

        log::info!(
            "Done: {} pairs, {} processed, {} skipped, {} masks written, {} empty",
            summary.pairs,
            summary.processed,
            summary.skipped,
            summary.masks_written,
            summary.empty_masks
        );

        Ok(summary)
    }

    fn process_pair(
        &mut self,
        pair: &SamplePair,
        input_ids: &[i64],
        pb: Option<&ProgressBar>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.segmenter.release_cache()?;
        say(
            pb,
            &format!(
                "Processing image: {} {}",
                pair.image_path.display(),
                pair.label_path.display()
            ),
        );

        if !pair.image_path.exists() {
            log::warn!("Image vanished since discovery: {:?}", pair.image_path);
            say(pb, &format!("File not found in {}", pair.image_path.display()));
            summary.skipped += 1;
            return Ok(());
        }

        let image = DataLoader::try_read(&pair.image_path)?;
        let images = self.processor.process(&image)?;
        let inputs = LisaInputs::new(&images, input_ids.to_vec(), self.options.max_new_tokens);
        let prediction = self.segmenter.evaluate(&inputs)?;

        let text_output = decode_output(self.tokenizer.as_ref(), &prediction.text_ids())?;
        say(pb, &format!("text_output: {}", text_output));

        let rgb = image.to_rgb8();
        let rendered: Vec<Option<RenderedMask>> = prediction
            .masks
            .par_iter()
            .enumerate()
            .map(|(i, m)| RenderedMask::render(i, m, &rgb))
            .collect::<Result<_>>()?;

        for r in rendered.iter().flatten() {
            let names = self.annotator.save(r, &pair.label_path)?;
            say(pb, &format!("{} has been saved.", names.mask_path.display()));
            say(pb, &format!("{} has been saved.", names.overlay_path.display()));
            summary.masks_written += 1;
        }
        summary.empty_masks += prediction.num_empty();
        summary.processed += 1;

        Ok(())
    }
}
