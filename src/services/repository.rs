//! On-disk project store.
//!
//! Every project lives in `projects/<id>/`; `data/projects.json` lists them
//! and is reconciled with the folder listing whenever it is read. Deleted
//! projects move to `deleted/<id>/` and `data/deleted_projects.json`.

use crate::error::{PrototypeError, Result};
use crate::types::{ProjectEntry, ProjectRecord, ProjectStatus};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use fs_extra::dir::CopyOptions;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const PROJECTS_DIR: &str = "projects";
pub const DELETED_DIR: &str = "deleted";
pub const DATA_DIR: &str = "data";
pub const PROJECTS_MANIFEST: &str = "projects.json";
pub const DELETED_MANIFEST: &str = "deleted_projects.json";

pub const MARKUP_FILE: &str = "index.html";
pub const RECORD_FILE: &str = "record.json";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const REFERENCE_DIR: &str = "reference";
pub const IMAGES_DIR: &str = "images";
pub const PRD_DIR: &str = "prd";

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_SAFE_NAME_CHARS: usize = 30;
const UNSAFE_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
pub const PENDING_NAME_SUFFIX: &str = " (待外部生成)";

pub struct ProjectRepository {
    root: PathBuf,
    projects_dir: PathBuf,
    deleted_dir: PathBuf,
    manifest: PathBuf,
    deleted_manifest: PathBuf,
    lock: Mutex<()>,
}

impl ProjectRepository {
    /// Opens the workspace at `root`, creating its folders and empty
    /// manifests as needed.
    pub async fn open(root: &Path) -> Result<Self> {
        let data_dir = root.join(DATA_DIR);
        let repository = Self {
            root: root.to_path_buf(),
            projects_dir: root.join(PROJECTS_DIR),
            deleted_dir: root.join(DELETED_DIR),
            manifest: data_dir.join(PROJECTS_MANIFEST),
            deleted_manifest: data_dir.join(DELETED_MANIFEST),
            lock: Mutex::new(()),
        };

        for dir in [&repository.projects_dir, &repository.deleted_dir, &data_dir] {
            fs::create_dir_all(dir).await?;
        }
        for manifest in [&repository.manifest, &repository.deleted_manifest] {
            if !manifest.exists() {
                fs::write(manifest, "[]").await?;
            }
        }

        debug!("Opened project repository at {}", root.display());
        Ok(repository)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.projects_dir.join(id)
    }

    pub fn deleted_project_dir(&self, id: &str) -> PathBuf {
        self.deleted_dir.join(id)
    }

    /// Existing folder of a live project.
    pub fn require_project(&self, id: &str) -> Result<PathBuf> {
        let dir = self.project_dir(id);
        if dir.is_dir() && !id.is_empty() && !id.contains(['/', '\\']) && id != ".." {
            Ok(dir)
        } else {
            Err(PrototypeError::ProjectNotFound { id: id.to_string() })
        }
    }

    pub async fn create_project(
        &self,
        name: &str,
        model_name: Option<String>,
        status: Option<ProjectStatus>,
    ) -> Result<ProjectEntry> {
        self.create_project_at(name, model_name, status, Local::now().naive_local())
            .await
    }

    pub async fn create_project_at(
        &self,
        name: &str,
        model_name: Option<String>,
        status: Option<ProjectStatus>,
        at: NaiveDateTime,
    ) -> Result<ProjectEntry> {
        let _guard = self.lock.lock().await;

        let id = generate_project_id(name, at);
        let dir = self.project_dir(&id);
        if dir.exists() {
            warn!("Project folder {} already exists, replacing it", dir.display());
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(dir.join(REFERENCE_DIR)).await?;

        let entry = ProjectEntry {
            id: id.clone(),
            name: name.to_string(),
            model_name,
            status,
            url: project_url(&id),
            date: at.format(DATE_FORMAT).to_string(),
            deleted_at: None,
        };

        let mut entries = read_manifest(&self.manifest).await?;
        upsert_entry(&mut entries, entry.clone());
        write_manifest(&self.manifest, &entries).await?;

        info!("Created project {}", id);
        Ok(entry)
    }

    /// Manifest rows reconciled with the folders actually on disk, newest
    /// first. The manifest is rewritten only when reconciliation changed it.
    pub async fn list_projects(&self) -> Result<Vec<ProjectEntry>> {
        let _guard = self.lock.lock().await;
        self.sync_locked().await
    }

    async fn sync_locked(&self) -> Result<Vec<ProjectEntry>> {
        let original = read_manifest(&self.manifest).await?;
        let original_ids: Vec<String> = original.iter().map(|p| p.id.clone()).collect();

        let mut existing = HashSet::new();
        let mut with_markup = HashSet::new();
        let mut folders = Vec::new();
        let mut listing = fs::read_dir(&self.projects_dir).await?;
        while let Some(entry) = listing.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();
            let has_markup = path.join(MARKUP_FILE).is_file();
            if has_markup || path.join(RECORD_FILE).is_file() {
                existing.insert(name.clone());
                folders.push(name.clone());
            }
            if has_markup {
                with_markup.insert(name);
            }
        }
        folders.sort();

        let mut seen = HashSet::new();
        let mut projects: Vec<ProjectEntry> = original
            .into_iter()
            .filter(|p| existing.contains(&p.id))
            .filter(|p| seen.insert(p.id.clone()))
            .collect();

        let mut changed = false;
        for project in projects.iter_mut() {
            if project.status == Some(ProjectStatus::PendingExternal)
                && with_markup.contains(&project.id)
            {
                info!("Project {} finished external generation", project.id);
                project.status = None;
                project.name = project.name.replace(PENDING_NAME_SUFFIX, "");
                project.url = project_url(&project.id);
                changed = true;
            }
        }

        for folder in folders {
            if seen.contains(&folder) {
                continue;
            }
            let (name, date) = match parse_project_id(&folder) {
                Some((name, at)) => (name, at.format(DATE_FORMAT).to_string()),
                None => (
                    folder.clone(),
                    Local::now().naive_local().format(DATE_FORMAT).to_string(),
                ),
            };
            info!("Discovered project folder {}", folder);
            projects.push(ProjectEntry {
                id: folder.clone(),
                name,
                model_name: None,
                status: None,
                url: project_url(&folder),
                date,
                deleted_at: None,
            });
            changed = true;
        }

        projects.sort_by(|a, b| b.date.cmp(&a.date));

        let ids: Vec<String> = projects.iter().map(|p| p.id.clone()).collect();
        if changed || ids != original_ids {
            write_manifest(&self.manifest, &projects).await?;
            info!("Project manifest updated: {} projects", projects.len());
        }

        Ok(projects)
    }

    /// Replaces the row with the same id, or inserts it first.
    pub async fn upsert(&self, entry: ProjectEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = read_manifest(&self.manifest).await?;
        upsert_entry(&mut entries, entry);
        write_manifest(&self.manifest, &entries).await
    }

    pub async fn set_status(&self, id: &str, status: Option<ProjectStatus>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = read_manifest(&self.manifest).await?;
        let entry = entries
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PrototypeError::ProjectNotFound { id: id.to_string() })?;
        entry.status = status;
        write_manifest(&self.manifest, &entries).await
    }

    /// Renames a project; the folder keeps its creation timestamp.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<ProjectEntry> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(PrototypeError::Config {
                reason: "new project name is empty".to_string(),
            });
        }

        let _guard = self.lock.lock().await;
        let mut entries = self.sync_locked().await?;
        let index = entries
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PrototypeError::ProjectNotFound { id: id.to_string() })?;

        let timestamp = match id.rsplitn(3, '_').collect::<Vec<_>>().as_slice() {
            [time, date, _] => format!("{}_{}", date, time),
            _ => format_timestamp(Local::now().naive_local()),
        };
        let safe = safe_name(new_name);

        let mut new_id = format!("{}_{}", safe, timestamp);
        let mut attempt = 2;
        while new_id != id && self.project_dir(&new_id).exists() {
            new_id = format!("{}_{}_{}", safe, attempt, timestamp);
            attempt += 1;
        }

        if new_id != id {
            move_dir(&self.project_dir(id), &self.project_dir(&new_id)).await?;
            info!("Renamed project folder {} -> {}", id, new_id);
        }

        let entry = &mut entries[index];
        entry.id = new_id.clone();
        entry.name = new_name.to_string();
        entry.url = project_url(&new_id);
        let renamed = entry.clone();
        write_manifest(&self.manifest, &entries).await?;

        Ok(renamed)
    }

    /// Duplicates a project folder under a new name and timestamp.
    pub async fn copy(&self, source_id: &str, new_name: &str) -> Result<ProjectEntry> {
        let source = self.require_project(source_id)?;
        let now = Local::now().naive_local();

        let _guard = self.lock.lock().await;
        let new_id = generate_project_id(new_name, now);
        let target = self.project_dir(&new_id);
        if target.exists() {
            fs::remove_dir_all(&target).await?;
        }
        fs::create_dir_all(&target).await?;

        let mut options = CopyOptions::new();
        options.content_only = true;
        options.overwrite = true;
        fs_extra::dir::copy(&source, &target, &options)?;
        info!("Copied project {} -> {}", source_id, new_id);

        let record_path = target.join(RECORD_FILE);
        if record_path.exists() {
            let mut record = read_record_file(&record_path).await?;
            record.created_at = now.format(DATE_FORMAT).to_string();
            record.copied_from = Some(source_id.to_string());
            write_record_file(&record_path, &record).await?;
        }

        let entry = ProjectEntry {
            id: new_id.clone(),
            name: new_name.to_string(),
            model_name: None,
            status: None,
            url: project_url(&new_id),
            date: now.format(DATE_FORMAT).to_string(),
            deleted_at: None,
        };
        let mut entries = self.sync_locked().await?;
        upsert_entry(&mut entries, entry.clone());
        write_manifest(&self.manifest, &entries).await?;

        Ok(entry)
    }

    /// Moves a project into `deleted/` and records when.
    pub async fn soft_delete(&self, id: &str) -> Result<ProjectEntry> {
        let _guard = self.lock.lock().await;
        let mut entries = read_manifest(&self.manifest).await?;
        let index = entries
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PrototypeError::ProjectNotFound { id: id.to_string() })?;

        let folder = self.project_dir(id);
        if folder.exists() {
            move_dir(&folder, &self.deleted_project_dir(id)).await?;
            info!("Moved project {} to {}", id, self.deleted_dir.display());
        }

        let mut entry = entries.remove(index);
        write_manifest(&self.manifest, &entries).await?;

        entry.deleted_at = Some(Local::now().naive_local().format(DATE_FORMAT).to_string());
        entry.url = format!("/{}/{}/{}", DELETED_DIR, id, MARKUP_FILE);
        let mut deleted = read_manifest(&self.deleted_manifest).await?;
        deleted.retain(|p| p.id != id);
        deleted.insert(0, entry.clone());
        write_manifest(&self.deleted_manifest, &deleted).await?;

        Ok(entry)
    }

    pub async fn restore(&self, id: &str) -> Result<ProjectEntry> {
        let _guard = self.lock.lock().await;
        let mut deleted = read_manifest(&self.deleted_manifest).await?;
        let index = deleted
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PrototypeError::ProjectNotFound { id: id.to_string() })?;

        let folder = self.deleted_project_dir(id);
        if folder.exists() {
            move_dir(&folder, &self.project_dir(id)).await?;
            info!("Restored project {}", id);
        }

        let mut entry = deleted.remove(index);
        write_manifest(&self.deleted_manifest, &deleted).await?;

        entry.deleted_at = None;
        entry.url = project_url(id);
        let mut entries = read_manifest(&self.manifest).await?;
        upsert_entry(&mut entries, entry.clone());
        write_manifest(&self.manifest, &entries).await?;

        Ok(entry)
    }

    pub async fn list_deleted(&self) -> Result<Vec<ProjectEntry>> {
        let _guard = self.lock.lock().await;
        read_manifest(&self.deleted_manifest).await
    }

    pub async fn read_record(&self, id: &str) -> Result<ProjectRecord> {
        let dir = self.require_project(id)?;
        read_record_file(&dir.join(RECORD_FILE)).await
    }

    pub async fn write_record(&self, id: &str, record: &ProjectRecord) -> Result<()> {
        let dir = self.require_project(id)?;
        write_record_file(&dir.join(RECORD_FILE), record).await
    }

    pub async fn write_prompt(&self, id: &str, prompt: &str) -> Result<()> {
        let dir = self.require_project(id)?;
        fs::write(dir.join(PROMPT_FILE), prompt).await?;
        Ok(())
    }

    /// Non-empty `prd/<page>.md` notes keyed by page.
    pub async fn load_prd_notes(&self, id: &str) -> Result<BTreeMap<String, String>> {
        let dir = self.require_project(id)?.join(PRD_DIR);
        load_prd_dir(&dir).await
    }

    pub async fn save_prd_note(&self, id: &str, page: &str, content: &str) -> Result<PathBuf> {
        let dir = self.require_project(id)?.join(PRD_DIR);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.md", safe_name(page)));
        fs::write(&path, content).await?;
        debug!("Saved PRD note {}", path.display());
        Ok(path)
    }
}

pub(crate) async fn load_prd_dir(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut notes = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(notes);
    }

    let mut listing = fs::read_dir(dir).await?;
    while let Some(entry) = listing.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(page) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(&path).await?;
        if !content.trim().is_empty() {
            notes.insert(page.to_string(), content);
        }
    }
    Ok(notes)
}

/// Display name with filesystem-hostile characters removed, spaces turned
/// into underscores, capped at 30 characters.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .filter(|c| !UNSAFE_NAME_CHARS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_SAFE_NAME_CHARS)
        .collect()
}

fn format_timestamp(at: NaiveDateTime) -> String {
    let (is_pm, hour) = at.hour12();
    format!(
        "{}_{}-{:02}-{:02}{}",
        at.format("%Y%m%d"),
        hour,
        at.minute(),
        at.second(),
        if is_pm { "pm" } else { "am" }
    )
}

/// `<safe name>_<YYYYMMDD>_<h-MM-SS><am|pm>`, e.g. `Demo_20260114_4-15-23pm`.
pub fn generate_project_id(name: &str, at: NaiveDateTime) -> String {
    format!("{}_{}", safe_name(name), format_timestamp(at))
}

/// Splits a project id back into its name and creation time.
pub fn parse_project_id(id: &str) -> Option<(String, NaiveDateTime)> {
    let parts: Vec<&str> = id.rsplitn(3, '_').collect();
    let [time, date, name] = parts.as_slice() else {
        return None;
    };

    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let lower = time.to_ascii_lowercase();
    let (clock, is_pm) = if let Some(clock) = lower.strip_suffix("pm") {
        (clock, true)
    } else if let Some(clock) = lower.strip_suffix("am") {
        (clock, false)
    } else {
        (lower.as_str(), false)
    };

    let fields: Vec<u32> = clock
        .split('-')
        .map(|f| f.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    let [hour, minute, second] = fields.as_slice() else {
        return None;
    };
    let hour = match (*hour, is_pm) {
        (12, false) => 0,
        (h, true) if h < 12 => h + 12,
        (h, _) => h,
    };

    let time = NaiveTime::from_hms_opt(hour, *minute, *second)?;
    Some((name.to_string(), date.and_time(time)))
}

fn project_url(id: &str) -> String {
    format!("/{}/{}/{}", PROJECTS_DIR, id, MARKUP_FILE)
}

fn upsert_entry(entries: &mut Vec<ProjectEntry>, entry: ProjectEntry) {
    match entries.iter_mut().find(|p| p.id == entry.id) {
        Some(existing) => *existing = entry,
        None => entries.insert(0, entry),
    }
}

async fn read_manifest(path: &Path) -> Result<Vec<ProjectEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).await?;
    match serde_json::from_str(&raw) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            Ok(Vec::new())
        }
    }
}

async fn write_manifest(path: &Path, entries: &[ProjectEntry]) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(entries)?).await?;
    Ok(())
}

async fn read_record_file(path: &Path) -> Result<ProjectRecord> {
    if !path.exists() {
        return Err(PrototypeError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn write_record_file(path: &Path, record: &ProjectRecord) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(record)?).await?;
    Ok(())
}

/// Moves a directory, replacing the target. Falls back to copy-and-delete
/// when a plain rename crosses filesystems.
async fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        fs::remove_dir_all(to).await?;
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    if let Err(e) = fs::rename(from, to).await {
        debug!("rename {} failed ({}), copying instead", from.display(), e);
        fs::create_dir_all(to).await?;
        let mut options = CopyOptions::new();
        options.content_only = true;
        options.overwrite = true;
        fs_extra::dir::move_dir(from, to, &options)?;
        if from.exists() {
            fs::remove_dir_all(from).await?;
        }
    }
    Ok(())
}
