//! Title catalog and save-file detection
//!
//! Each supported game is a [`KnownTitle`]: a short code such as `th08`, a
//! display name, the save file's name and where the game usually writes it.
//! Older titles write next to the executable, which Windows redirects into
//! `%LOCALAPPDATA%\VirtualStore` when the game lives under `Program Files`.
//! Newer titles write to `%APPDATA%\ShanghaiAlice\<code>`.
//!
//! [`detect`] probes those locations, plus a user-supplied game directory,
//! and reports what it found.

use crate::error::{Result, SyncError};
use crate::metadata::MetadataProvider;
use crate::types::FileMetadata;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Save file name used for codes missing from the catalog
pub const DEFAULT_SAVE_FILE: &str = "score.dat";

const PUBLISHER_DIR: &str = "上海アリス幻樂団";
const APPDATA_DIR: &str = "ShanghaiAlice";

/// Where a title keeps its save file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaveLocation {
    /// Next to the executable, possibly redirected into VirtualStore
    GameDir,
    /// `%APPDATA%\ShanghaiAlice\<code>\`
    AppData,
}

/// One supported game
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownTitle {
    pub code: &'static str,
    pub name: &'static str,
    pub file_name: &'static str,
    pub location: SaveLocation,
    /// Whether VirtualStore redirection applies
    pub virtual_store: bool,
}

macro_rules! title {
    ($code:literal, $name:literal, $file:literal, GameDir, $vs:literal) => {
        KnownTitle {
            code: $code,
            name: $name,
            file_name: $file,
            location: SaveLocation::GameDir,
            virtual_store: $vs,
        }
    };
    ($code:literal, $name:literal, $file:literal, AppData) => {
        KnownTitle {
            code: $code,
            name: $name,
            file_name: $file,
            location: SaveLocation::AppData,
            virtual_store: false,
        }
    };
}

/// Every known title in release order
pub static KNOWN_TITLES: &[KnownTitle] = &[
    title!("th06", "東方紅魔郷", "score.dat", GameDir, true),
    title!("th07", "東方妖々夢", "score.dat", GameDir, true),
    title!("th08", "東方永夜抄", "score.dat", GameDir, true),
    title!("th09", "東方花映塚", "score.dat", GameDir, true),
    title!("th095", "東方文花帖", "scoreth095.dat", GameDir, true),
    title!("th10", "東方風神録", "scoreth10.dat", GameDir, true),
    title!("th11", "東方地霊殿", "scoreth11.dat", GameDir, false),
    title!("th12", "東方星蓮船", "scoreth12.dat", GameDir, false),
    title!("th125", "ダブルスポイラー", "scoreth125.dat", AppData),
    title!("th128", "妖精大戦争", "scoreth128.dat", AppData),
    title!("th13", "東方神霊廟", "scoreth13.dat", AppData),
    title!("th14", "東方輝針城", "scoreth14.dat", AppData),
    title!("th143", "弾幕アマノジャク", "scoreth143.dat", AppData),
    title!("th15", "東方紺珠伝", "scoreth15.dat", AppData),
    title!("th16", "東方天空璋", "scoreth16.dat", AppData),
    title!("th165", "秘封ナイトメアダイアリー", "scoreth165.dat", AppData),
    title!("th17", "東方鬼形獣", "scoreth17.dat", AppData),
    title!("th18", "東方虹龍洞", "scoreth18.dat", AppData),
    title!("th185", "バレットフィリア達の闇市場", "scoreth185.dat", AppData),
    title!("th19", "東方獣王園", "scoreth19.dat", AppData),
    title!("th20", "東方錦上京", "scoreth20.dat", AppData),
];

/// Whether `code` looks like a title code (`th` followed by digits)
pub fn is_valid_title_code(code: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^th\d+$").expect("static pattern is valid"))
        .is_match(code)
}

/// Validate a title code
pub fn validate_title_code(code: &str) -> Result<()> {
    if is_valid_title_code(code) {
        Ok(())
    } else {
        Err(SyncError::InvalidTitle(code.to_string()))
    }
}

/// Catalog entry for a code
pub fn find_title(code: &str) -> Option<&'static KnownTitle> {
    KNOWN_TITLES.iter().find(|t| t.code == code)
}

/// Save file name for a code
pub fn save_file_name(code: &str) -> &'static str {
    find_title(code).map_or(DEFAULT_SAVE_FILE, |t| t.file_name)
}

/// `th08 (東方永夜抄)`, or just the code when unknown
pub fn display_name(code: &str) -> String {
    match find_title(code) {
        Some(title) => format!("{} ({})", title.code, title.name),
        None => code.to_string(),
    }
}

/// Sort codes by release order, unknown codes last in their given order
pub fn sort_by_release(mut codes: Vec<String>) -> Vec<String> {
    let order: HashMap<&str, usize> = KNOWN_TITLES
        .iter()
        .enumerate()
        .map(|(i, t)| (t.code, i))
        .collect();
    codes.sort_by_key(|code| order.get(code.as_str()).copied().unwrap_or(usize::MAX));
    codes
}

/// Base directories searched during detection
#[derive(Debug, Clone, Default)]
pub struct SearchRoots {
    /// `%APPDATA%`
    pub app_data: Option<PathBuf>,
    /// `%LOCALAPPDATA%`
    pub local_app_data: Option<PathBuf>,
}

impl SearchRoots {
    /// Read `APPDATA` and `LOCALAPPDATA` from the environment
    pub fn from_env() -> Self {
        let var = |name| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            app_data: var("APPDATA"),
            local_app_data: var("LOCALAPPDATA"),
        }
    }
}

impl KnownTitle {
    /// Well-known locations of this title's save file
    pub fn known_paths(&self, roots: &SearchRoots) -> Vec<PathBuf> {
        match self.location {
            SaveLocation::AppData => roots
                .app_data
                .iter()
                .map(|base| base.join(APPDATA_DIR).join(self.code).join(self.file_name))
                .collect(),
            SaveLocation::GameDir if self.virtual_store => roots
                .local_app_data
                .iter()
                .flat_map(|base| {
                    ["Program Files", "Program Files (x86)"].into_iter().map(move |pf| {
                        base.join("VirtualStore")
                            .join(pf)
                            .join(PUBLISHER_DIR)
                            .join(self.name)
                            .join(self.file_name)
                    })
                })
                .collect(),
            SaveLocation::GameDir => Vec::new(),
        }
    }

    /// Locations of this title's save file under a game directory
    ///
    /// A save directly in `game_dir` with a name shared between titles is
    /// only attributed to this title when `<code>.exe` sits beside it.
    pub fn game_dir_paths(&self, game_dir: &Path) -> Vec<PathBuf> {
        if self.location != SaveLocation::GameDir {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let shared_name = KNOWN_TITLES
            .iter()
            .filter(|t| t.file_name == self.file_name)
            .count()
            > 1;
        if !shared_name || game_dir.join(format!("{}.exe", self.code)).is_file() {
            paths.push(game_dir.join(self.file_name));
        }
        paths.push(game_dir.join(self.code).join(self.file_name));
        paths.push(game_dir.join(self.name).join(self.file_name));
        paths
    }
}

/// A save file found during detection
#[derive(Debug, Clone)]
pub struct DetectCandidate {
    pub title: &'static KnownTitle,
    pub path: PathBuf,
    pub metadata: FileMetadata,
}

/// Everything [`detect`] found
#[derive(Debug, Clone, Default)]
pub struct DetectReport {
    pub candidates: Vec<DetectCandidate>,
    pub not_found: Vec<&'static KnownTitle>,
}

/// Probe every known title's save locations
pub fn detect(
    roots: &SearchRoots,
    game_dir: Option<&Path>,
    metadata: &dyn MetadataProvider,
) -> Result<DetectReport> {
    let mut report = DetectReport::default();

    for title in KNOWN_TITLES {
        let mut probes = title.known_paths(roots);
        if let Some(dir) = game_dir {
            probes.extend(title.game_dir_paths(dir));
        }

        let mut found: Vec<PathBuf> = Vec::new();
        for path in probes {
            if found.contains(&path) {
                continue;
            }
            let meta = metadata.stat(&path)?;
            if !meta.exists {
                continue;
            }
            debug!("Found {} save at {:?}", title.code, path);
            found.push(path.clone());
            report.candidates.push(DetectCandidate {
                title,
                path,
                metadata: meta,
            });
        }

        if found.is_empty() {
            report.not_found.push(title);
        }
    }

    Ok(report)
}
