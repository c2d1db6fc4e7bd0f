//! App lifecycle workflows.
//!
//! Each workflow awaits its platform calls one after another, writes the
//! documents through the repository and reports the outcome through the
//! injected notifier. Failures are both notified and returned.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::db::{timestamp, Repository};
use crate::errors::AppError;
use crate::models::{
    App, CreateAppRequest, IterationOutcome, LaunchMethod, LaunchOutcome, RedeployCause, Version,
    DUPLICATE_NOTE, INITIAL_NOTE,
};
use crate::notify::{Notifier, ToastKind};
use crate::platform::{
    best_effort, names, AppRegistration, ChatMessage, HostedSite, Platform, RegisteredApp,
};
use crate::validation::{extract_markup, validate_markup};

/// Instruction sent ahead of every generation request.
pub const SYSTEM_PROMPT: &str = "You are an expert web developer. Create a COMPLETE single HTML file app.
RULES:
- Start with <!DOCTYPE html>
- ALL CSS in <style> tag, ALL JS in <script> tag
- Modern CSS: variables, flexbox/grid, animations, gradients
- Modern JS: ES6+, localStorage, event handling
- Responsive and polished UI
- NO external dependencies
- Return ONLY HTML code";

/// Instruction sent ahead of every iteration request.
pub const ITERATE_PROMPT: &str = "You are an expert web developer improving an existing single HTML file app.
RULES:
- Apply the requested change and keep everything else working
- Start with one or two sentences describing what you changed
- Then return the COMPLETE updated file, starting with <!DOCTYPE html>
- ALL CSS in <style> tag, ALL JS in <script> tag
- NO external dependencies";

/// Earlier conversation turns sent with an iteration request.
pub const MAX_HISTORY_TURNS: usize = 20;

/// File every deployment directory serves.
pub const INDEX_FILE: &str = "index.html";

/// Characters of the prompt used as a title when none is given.
const TITLE_FROM_PROMPT_CHARS: usize = 50;

/// Progress of the create workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub generating: bool,
    pub stage: String,
}

/// Apps picked in bulk-selection mode.
#[derive(Debug, Clone, Default)]
pub struct BulkSelection {
    pub selected: HashSet<String>,
    pub bulk_mode: bool,
}

/// Clears the busy flag when the create workflow exits.
struct BusyGuard<'a> {
    status: &'a watch::Sender<GenerationStatus>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|s| s.generating = false);
    }
}

/// Orchestrates generation, deployment and the app/version documents.
pub struct AppManager {
    repo: Arc<Repository>,
    platform: Platform,
    notifier: Arc<dyn Notifier>,
    status: watch::Sender<GenerationStatus>,
    default_model: String,
}

impl AppManager {
    pub fn new(
        repo: Arc<Repository>,
        platform: Platform,
        notifier: Arc<dyn Notifier>,
        default_model: impl Into<String>,
    ) -> Self {
        let (status, _) = watch::channel(GenerationStatus::default());
        Self {
            repo,
            platform,
            notifier,
            status,
            default_model: default_model.into(),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        self.status.borrow().clone()
    }

    fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        if !stage.is_empty() {
            tracing::debug!(%stage, "generation stage");
        }
        self.status.send_modify(|s| s.stage = stage);
    }

    fn begin_generation(&self) -> BusyGuard<'_> {
        self.status.send_modify(|s| {
            s.generating = true;
            s.stage = "Initializing...".to_string();
        });
        BusyGuard {
            status: &self.status,
        }
    }

    // ==================== CREATE ====================

    /// Generate, validate, deploy and register a new app.
    ///
    /// Returns `Ok(None)` without doing anything when the prompt is blank or
    /// there is no platform session.
    pub async fn create(&self, request: &CreateAppRequest) -> Result<Option<App>, AppError> {
        if request.prompt.trim().is_empty() || !self.platform.has_session() {
            tracing::debug!("create skipped: blank prompt or no session");
            return Ok(None);
        }

        let _busy = self.begin_generation();
        let result = self.generate_and_deploy(request).await;
        self.set_stage("");

        match result {
            Ok(app) => {
                tracing::info!(app_id = %app.id, subdomain = %app.subdomain, "App created");
                self.notifier
                    .notify("App created and deployed successfully!", ToastKind::Success);
                self.notifier.open_url(&app.hosted_url);
                Ok(Some(app))
            }
            Err(e) => {
                tracing::error!("App creation failed: {}", e);
                self.notifier
                    .notify(&format!("Error: {}", e.message()), ToastKind::Error);
                Err(e)
            }
        }
    }

    async fn generate_and_deploy(&self, request: &CreateAppRequest) -> Result<App, AppError> {
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string();
        self.set_stage(format!("Model: {}", model));

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Build: {}", request.prompt)),
        ];
        let reply = self.platform.chat.complete(&messages, &model).await?;
        let code = extract_markup(&reply.into_text());
        validate_markup(&code)?;

        self.set_stage("Creating filesystem...");
        let dir = names::deployment_dir();
        self.write_deployment(&dir, &code).await?;

        self.set_stage("Deploying...");
        let subdomain = self.subdomain_for(&request.app_name);
        let site = self.platform.hosting.create(&subdomain, &dir).await?;
        let hosted_url = self.platform.hosting.url_for(&site.subdomain);

        self.set_stage("Registering app...");
        let name = match request.app_name.trim() {
            "" => self.platform.registry.random_name(),
            name => name.to_string(),
        };
        let title = match request.app_title.trim() {
            "" => request.prompt.chars().take(TITLE_FROM_PROMPT_CHARS).collect(),
            title => title.to_string(),
        };
        let registered = self
            .register(AppRegistration {
                name,
                index_url: hosted_url.clone(),
                title: title.clone(),
                description: request.prompt.clone(),
                maximize_on_start: true,
                dedupe_name: true,
            })
            .await?;

        self.set_stage("Saving to database...");
        let app = App {
            id: String::new(),
            app_name: registered.name,
            app_uid: Some(registered.uid),
            subdomain: site.subdomain,
            hosted_url,
            code,
            prompt: request.prompt.clone(),
            model,
            app_title: title,
            tags: request.tags.clone(),
            favorite: false,
            views: 0,
            version: 1,
            dir,
            created_at: timestamp(),
            updated_at: None,
            revision: 0,
        };
        let (app, _) = self.repo.insert_app_with_version(&app, INITIAL_NOTE).await?;
        Ok(app)
    }

    /// Slug of the requested name, or a random name when nothing is left.
    fn subdomain_for(&self, app_name: &str) -> String {
        match names::slugify(app_name) {
            slug if slug.is_empty() => self.platform.registry.random_name(),
            slug => slug,
        }
    }

    /// Host `dir` under a subdomain derived from `label`, falling back once to
    /// a random name when that subdomain is taken.
    async fn host_fresh(&self, label: &str, dir: &str) -> Result<HostedSite, AppError> {
        let subdomain = self.subdomain_for(label);
        match self.platform.hosting.create(&subdomain, dir).await {
            Ok(site) => Ok(site),
            Err(e) => {
                tracing::warn!(%subdomain, "hosting create failed, retrying with a random name: {}", e);
                let retry = self.platform.registry.random_name();
                Ok(self.platform.hosting.create(&retry, dir).await?)
            }
        }
    }

    async fn write_deployment(&self, dir: &str, code: &str) -> Result<(), AppError> {
        self.platform.fs.mkdir(dir).await?;
        self.platform
            .fs
            .write(&format!("{}/{}", dir, INDEX_FILE), code)
            .await?;
        Ok(())
    }

    /// Register in the app registry, retrying once under a random name.
    async fn register(&self, registration: AppRegistration) -> Result<RegisteredApp, AppError> {
        match self.platform.registry.create(&registration).await {
            Ok(registered) => Ok(registered),
            Err(e) => {
                tracing::warn!(
                    name = %registration.name,
                    "registry create failed, retrying with a random name: {}",
                    e
                );
                let retry = AppRegistration {
                    name: self.platform.registry.random_name(),
                    dedupe_name: false,
                    ..registration
                };
                Ok(self.platform.registry.create(&retry).await?)
            }
        }
    }

    // ==================== UPDATE ====================

    /// Redeploy an app with new code as the next version.
    ///
    /// Returns `Ok(None)` when `code` is empty. `tags` replaces the app's tags
    /// when given.
    pub async fn update(
        &self,
        app: &App,
        code: &str,
        tags: Option<Vec<String>>,
    ) -> Result<Option<App>, AppError> {
        self.redeploy(app, code, tags, RedeployCause::Update).await
    }

    /// Shared by update, restore and iterate; `cause` only changes the version note.
    pub(crate) async fn redeploy(
        &self,
        app: &App,
        code: &str,
        tags: Option<Vec<String>>,
        cause: RedeployCause,
    ) -> Result<Option<App>, AppError> {
        if code.is_empty() {
            tracing::debug!(app_id = %app.id, "update skipped: empty code");
            return Ok(None);
        }

        match self.redeploy_inner(app, code, tags, &cause).await {
            Ok(updated) => {
                tracing::info!(app_id = %updated.id, version = updated.version, "App redeployed");
                self.notifier.notify(
                    &format!("App updated to version {}!", updated.version),
                    ToastKind::Success,
                );
                self.notifier.open_url(&updated.hosted_url);
                Ok(Some(updated))
            }
            Err(e) => {
                tracing::error!(app_id = %app.id, "App update failed: {}", e);
                self.notifier
                    .notify(&format!("Update failed: {}", e.message()), ToastKind::Error);
                Err(e)
            }
        }
    }

    async fn redeploy_inner(
        &self,
        app: &App,
        code: &str,
        tags: Option<Vec<String>>,
        cause: &RedeployCause,
    ) -> Result<App, AppError> {
        if !app.dir.is_empty() {
            best_effort("remove previous directory", self.platform.fs.rmdir(&app.dir)).await;
        }

        let dir = names::deployment_dir();
        self.write_deployment(&dir, code).await?;

        // Imported apps have no deployment yet and get one here
        let site = if app.subdomain.is_empty() {
            self.host_fresh(&app.app_title, &dir).await?
        } else {
            best_effort(
                "delete previous site",
                self.platform.hosting.delete(&app.subdomain),
            )
            .await;
            self.platform.hosting.create(&app.subdomain, &dir).await?
        };
        let hosted_url = self.platform.hosting.url_for(&site.subdomain);

        let (app_name, app_uid) = if app.app_name.is_empty() {
            let registered = self
                .register(AppRegistration {
                    name: site.subdomain.clone(),
                    index_url: hosted_url.clone(),
                    title: app.app_title.clone(),
                    description: app.prompt.clone(),
                    maximize_on_start: true,
                    dedupe_name: true,
                })
                .await?;
            (registered.name, Some(registered.uid))
        } else {
            best_effort(
                "update registry entry",
                self.platform.registry.update(&app.app_name, &hosted_url),
            )
            .await;
            (app.app_name.clone(), app.app_uid.clone())
        };

        let new_version = app.version.max(1) + 1;
        let note = cause.note(new_version);

        let next = App {
            app_name,
            app_uid,
            subdomain: site.subdomain,
            code: code.to_string(),
            dir,
            hosted_url,
            version: new_version,
            tags: tags.unwrap_or_else(|| app.tags.clone()),
            updated_at: Some(timestamp()),
            ..app.clone()
        };
        let (updated, _) = self.repo.commit_redeploy(&next, &note).await?;
        Ok(updated)
    }

    // ==================== ITERATE ====================

    /// Ask the chat model to change an app and redeploy the result.
    ///
    /// The model sees the current code, the last [`MAX_HISTORY_TURNS`] turns
    /// of `history` and the new instruction. Returns `Ok(None)` for a blank
    /// instruction. Invalid markup in the reply leaves the app untouched.
    pub async fn iterate(
        &self,
        app: &App,
        instruction: &str,
        history: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<Option<IterationOutcome>, AppError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            tracing::debug!(app_id = %app.id, "iterate skipped: blank instruction");
            return Ok(None);
        }

        let _busy = self.begin_generation();
        let generated = self.generate_iteration(app, instruction, history, model).await;
        self.set_stage("");

        let (code, commentary) = match generated {
            Ok(generated) => generated,
            Err(e) => {
                tracing::error!(app_id = %app.id, "App iteration failed: {}", e);
                self.notifier.notify(
                    &format!("Iteration failed: {}", e.message()),
                    ToastKind::Error,
                );
                return Err(e);
            }
        };

        let cause = RedeployCause::Iteration(instruction.to_string());
        let Some(updated) = self.redeploy(app, &code, None, cause).await? else {
            return Ok(None);
        };
        let content = match commentary {
            Some(text) => text,
            None => format!("Applied your changes as version {}.", updated.version),
        };
        Ok(Some(IterationOutcome {
            app: updated,
            message: ChatMessage::assistant(content),
        }))
    }

    /// Returns the validated code and the model's commentary, if any.
    async fn generate_iteration(
        &self,
        app: &App,
        instruction: &str,
        history: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<(String, Option<String>), AppError> {
        let model = [model.map(str::trim), Some(app.model.trim())]
            .into_iter()
            .flatten()
            .find(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string();
        self.set_stage(format!("Model: {}", model));

        let messages = iteration_messages(&app.code, instruction, history);
        let reply = self.platform.chat.complete(&messages, &model).await?.into_text();

        self.set_stage("Validating...");
        let code = extract_markup(&reply);
        validate_markup(&code)?;
        Ok((code, commentary(&reply)))
    }

    // ==================== DUPLICATE ====================

    /// Deploy a copy of an app under a `-copy` name with a fresh history.
    pub async fn duplicate(&self, source: &App) -> Result<Option<App>, AppError> {
        if !self.platform.has_session() {
            tracing::debug!("duplicate skipped: no session");
            return Ok(None);
        }

        match self.duplicate_inner(source).await {
            Ok(copy) => {
                tracing::info!(source = %source.id, app_id = %copy.id, "App duplicated");
                self.notifier.notify(
                    &format!("App duplicated successfully as \"{}\"!", copy.app_title),
                    ToastKind::Success,
                );
                Ok(Some(copy))
            }
            Err(e) => {
                tracing::error!(source = %source.id, "App duplication failed: {}", e);
                self.notifier.notify(
                    &format!("Duplication failed: {}", e.message()),
                    ToastKind::Error,
                );
                Err(e)
            }
        }
    }

    async fn duplicate_inner(&self, source: &App) -> Result<App, AppError> {
        let original_name = [&source.app_name, &source.subdomain, &source.app_title]
            .into_iter()
            .find(|n| !n.is_empty())
            .map_or("app", String::as_str);
        let name = names::copy_name(original_name);
        let title = names::copy_name(if source.app_title.is_empty() {
            &source.app_name
        } else {
            &source.app_title
        });

        let dir = names::copy_deployment_dir();
        self.write_deployment(&dir, &source.code).await?;

        let subdomain = self.subdomain_for(&name);
        let site = self.platform.hosting.create(&subdomain, &dir).await?;
        let hosted_url = self.platform.hosting.url_for(&site.subdomain);

        let registered = self
            .register(AppRegistration {
                name,
                index_url: hosted_url.clone(),
                title: title.clone(),
                description: source.prompt.clone(),
                maximize_on_start: true,
                dedupe_name: true,
            })
            .await?;

        let copy = App {
            id: String::new(),
            app_name: registered.name,
            app_uid: Some(registered.uid),
            subdomain: site.subdomain,
            hosted_url,
            code: source.code.clone(),
            prompt: source.prompt.clone(),
            model: source.model.clone(),
            app_title: title,
            tags: source.tags.clone(),
            favorite: false,
            views: 0,
            version: 1,
            dir,
            created_at: timestamp(),
            updated_at: None,
            revision: 0,
        };
        let (copy, _) = self
            .repo
            .insert_app_with_version(&copy, DUPLICATE_NOTE)
            .await?;
        Ok(copy)
    }

    // ==================== DELETE ====================

    /// Tear down an app's deployment and remove it with its versions.
    ///
    /// Platform cleanup is best effort. `all_versions` may hold versions of
    /// other apps; only this app's are deleted.
    pub async fn delete(&self, app: &App, all_versions: &[Version]) -> Result<(), AppError> {
        match self.delete_inner(app, all_versions).await {
            Ok(()) => {
                tracing::info!(app_id = %app.id, "App deleted");
                self.notifier
                    .notify("App deleted successfully!", ToastKind::Success);
                Ok(())
            }
            Err(e) => {
                tracing::error!(app_id = %app.id, "App deletion failed: {}", e);
                self.notifier
                    .notify(&format!("Delete failed: {}", e.message()), ToastKind::Error);
                Err(e)
            }
        }
    }

    async fn delete_inner(&self, app: &App, all_versions: &[Version]) -> Result<(), AppError> {
        if !app.dir.is_empty() {
            best_effort("remove directory", self.platform.fs.rmdir(&app.dir)).await;
        }
        if !app.app_name.is_empty() {
            best_effort(
                "delete registry entry",
                self.platform.registry.delete(&app.app_name),
            )
            .await;
        }
        if !app.subdomain.is_empty() {
            best_effort("delete site", self.platform.hosting.delete(&app.subdomain)).await;
        }

        for version in all_versions.iter().filter(|v| v.app_id == app.id) {
            self.repo.delete_version(&version.id).await?;
        }
        self.repo.delete_app(&app.id).await
    }

    /// Delete every selected app, one at a time, then leave bulk mode.
    ///
    /// A failed delete has already been notified and does not stop the rest.
    /// Returns how many apps were deleted.
    pub async fn bulk_delete(
        &self,
        selection: &mut BulkSelection,
        apps: &[App],
        versions: &[Version],
    ) -> usize {
        let mut deleted = 0;
        for app in apps.iter().filter(|a| selection.selected.contains(&a.id)) {
            match self.delete(app, versions).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(app_id = %app.id, "bulk delete continues after failure: {}", e),
            }
        }

        selection.selected.clear();
        selection.bulk_mode = false;
        deleted
    }

    // ==================== SINGLE-FIELD WRITES ====================

    pub async fn toggle_favorite(&self, app: &App) -> Result<App, AppError> {
        self.repo
            .put_app(&App {
                favorite: !app.favorite,
                ..app.clone()
            })
            .await
    }

    pub async fn increment_views(&self, app: &App) -> Result<App, AppError> {
        self.repo
            .put_app(&App {
                views: app.views + 1,
                ..app.clone()
            })
            .await
    }

    /// Count a view and launch through the registry, falling back to opening
    /// the hosted URL. Fails only for an app without a deployment or when the
    /// view write fails.
    pub async fn launch(&self, app: &App) -> Result<LaunchOutcome, AppError> {
        if app.hosted_url.is_empty() {
            return Err(AppError::Validation(format!(
                "App {} is not deployed yet, update it to deploy",
                app.id
            )));
        }
        let app = self.increment_views(app).await?;

        if !app.app_name.is_empty() {
            match self.platform.registry.launch(&app.app_name).await {
                Ok(()) => {
                    self.notifier
                        .notify(&format!("Launched {}!", app.app_name), ToastKind::Success);
                    return Ok(LaunchOutcome {
                        method: LaunchMethod::Registry,
                        url: app.hosted_url.clone(),
                        app,
                    });
                }
                Err(e) => {
                    tracing::warn!(name = %app.app_name, "registry launch failed, opening browser: {}", e)
                }
            }
        }

        self.notifier.open_url(&app.hosted_url);
        Ok(LaunchOutcome {
            method: LaunchMethod::Browser,
            url: app.hosted_url.clone(),
            app,
        })
    }
}

/// System prompt, current code, recent history, then the instruction.
fn iteration_messages(code: &str, instruction: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.is_conversation_turn())
        .collect();
    let recent = &turns[turns.len().saturating_sub(MAX_HISTORY_TURNS)..];

    let mut messages = Vec::with_capacity(recent.len() + 3);
    messages.push(ChatMessage::system(ITERATE_PROMPT));
    messages.push(ChatMessage::user(format!(
        "Current app code:\n```html\n{}\n```",
        code
    )));
    messages.extend(recent.iter().map(|m| (*m).clone()));
    messages.push(ChatMessage::user(instruction));
    messages
}

/// Text the model wrote ahead of the code, if any.
fn commentary(reply: &str) -> Option<String> {
    let lower = reply.to_ascii_lowercase();
    let start = [lower.find("```"), lower.find("<!doctype")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(reply.len());
    let text = reply[..start].trim();
    (!text.is_empty()).then(|| text.to_string())
}
