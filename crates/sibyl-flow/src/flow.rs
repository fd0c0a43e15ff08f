//! Answering one question.

use std::collections::HashSet;

use sibyl_core::{Context, LogEntry};
use sibyl_model_host::HostError;
use sibyl_wiki::{Page, PageId, SearchKind, WikiError};
use tracing::{debug, info};

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::prompt::{self, Article};
use crate::source::{KnowledgeSource, Model};
use crate::terms::extract_search_terms;

/// State of a single request: the question and the background gathered so far.
pub struct Flow<'a> {
    model: &'a dyn Model,
    source: &'a dyn KnowledgeSource,
    config: &'a FlowConfig,
    question: &'a str,
    background: Vec<Article>,
    /// Pages already fetched, whether or not they made it into the prompt.
    considered: HashSet<i64>,
}

impl<'a> Flow<'a> {
    pub fn new(
        model: &'a dyn Model,
        source: &'a dyn KnowledgeSource,
        config: &'a FlowConfig,
        question: &'a str,
    ) -> Self {
        Self {
            model,
            source,
            config,
            question,
            background: Vec::new(),
            considered: HashSet::new(),
        }
    }

    /// Gather background for the question within the token budget, then
    /// generate the answer.
    pub async fn respond(mut self, ctx: &Context, log: &mut LogEntry) -> Result<String, FlowError> {
        let terms = self
            .search_terms(ctx, log)
            .await
            .map_err(FlowError::SearchTerms)?;
        info!("search terms: {:?}", terms);
        log.search_terms = terms.clone();

        let mut prompt = prompt::response_prompt(self.question, &[]);
        let mut prompt_tokens = self
            .model
            .count_tokens(ctx, &prompt)
            .await
            .map_err(FlowError::CountTokens)?;
        debug!("baseline prompt: {} tokens", prompt_tokens);

        'augment: for term in &terms {
            if self.config.budget_exhausted(prompt_tokens) {
                break;
            }
            let pages = self
                .find_pages(ctx, term)
                .await
                .map_err(|source| FlowError::Search {
                    term: term.clone(),
                    source,
                })?;
            log.search_results
                .extend(pages.iter().map(|page| page.title.clone()));

            for page in pages {
                if self.config.budget_exhausted(prompt_tokens) {
                    break 'augment;
                }
                if !self.considered.insert(page.id) {
                    debug!("already considered page {:?} ({})", page.title, page.id);
                    continue;
                }
                let content = self.source.get(ctx, page.id).await.map_err(|source| {
                    FlowError::Fetch {
                        title: page.title.clone(),
                        id: page.id,
                        source,
                    }
                })?;
                let added = self
                    .add_background(ctx, log, &page, &content)
                    .await
                    .map_err(|source| FlowError::Augment {
                        title: page.title.clone(),
                        id: page.id,
                        source,
                    })?;
                match added {
                    Some((new_prompt, new_tokens)) => {
                        prompt = new_prompt;
                        prompt_tokens = new_tokens;
                    }
                    None => info!("page {:?} does not fit, skipping", page.title),
                }
            }
        }

        log.used_results
            .extend(self.background.iter().map(|article| article.title.clone()));
        info!(
            "answering with {} background pages, {} tokens",
            self.background.len(),
            prompt_tokens
        );

        self.model
            .generate(ctx, &prompt, log)
            .await
            .map_err(FlowError::Respond)
    }

    async fn search_terms(&self, ctx: &Context, log: &mut LogEntry) -> Result<Vec<String>, HostError> {
        let reply = self
            .model
            .generate(ctx, &prompt::search_prompt(self.question), log)
            .await?;
        Ok(extract_search_terms(&reply, self.config))
    }

    /// Title matches first, topped up with text matches.
    async fn find_pages(&self, ctx: &Context, term: &str) -> Result<Vec<PageId>, WikiError> {
        let wanted = self.config.results_per_term;
        let mut pages = self
            .source
            .search(ctx, term, SearchKind::Title, wanted)
            .await?;
        if pages.len() < wanted {
            let extra = self
                .source
                .search(ctx, term, SearchKind::Text, wanted - pages.len())
                .await?;
            pages.extend(extra);
        }
        Ok(pages)
    }

    /// Try to fit `page` into the background, summarizing it if the full
    /// text is too long. Returns the new prompt and its size, or `None` if
    /// the page had to be left out.
    async fn add_background(
        &mut self,
        ctx: &Context,
        log: &mut LogEntry,
        page: &PageId,
        content: &Page,
    ) -> Result<Option<(String, usize)>, HostError> {
        let text = content.content();
        let mut candidate = self.background.clone();
        candidate.push(Article {
            page_id: page.id,
            title: page.title.clone(),
            content: text.clone(),
        });

        let prompt = prompt::response_prompt(self.question, &candidate);
        let tokens = self.model.count_tokens(ctx, &prompt).await?;
        if self.config.fits(tokens) {
            debug!("added page {:?} ({} tokens)", page.title, tokens);
            self.background = candidate;
            return Ok(Some((prompt, tokens)));
        }

        debug!(
            "page {:?} too long ({} tokens), summarizing",
            page.title, tokens
        );
        let summary_prompt = prompt::summary_prompt(self.question, &text, self.config.summary_words);
        let summary = self.model.generate(ctx, &summary_prompt, log).await?;
        if let Some(article) = candidate.last_mut() {
            article.content = summary;
        }

        let prompt = prompt::response_prompt(self.question, &candidate);
        let tokens = self.model.count_tokens(ctx, &prompt).await?;
        if self.config.fits(tokens) {
            debug!("added summary of {:?} ({} tokens)", page.title, tokens);
            self.background = candidate;
            return Ok(Some((prompt, tokens)));
        }

        Ok(None)
    }
}
