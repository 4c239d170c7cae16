//! Font resolution shared by the PDF report and the chart renderer.
//!
//! A font family is four TTF files.  Directories are searched in order: the configured fonts
//! directory, `KPI_REPORT_FONTS_DIR`, `assets/fonts` next to the executable and in the crate,
//! then the usual system locations.  The first directory holding a complete family wins.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use log::{debug, warn};

/// Environment variable naming an extra font directory.
pub const FONTS_DIR_ENV: &str = "KPI_REPORT_FONTS_DIR";

/// File names of one font family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FamilyFiles {
    pub name: &'static str,
    pub regular: &'static str,
    pub bold: &'static str,
    pub italic: &'static str,
    pub bold_italic: &'static str,
}

impl FamilyFiles {
    fn files(&self) -> [&'static str; 4] {
        [self.regular, self.bold, self.italic, self.bold_italic]
    }

    fn missing_in(&self, directory: &Path) -> Vec<&'static str> {
        self.files()
            .into_iter()
            .filter(|file| !directory.join(file).is_file())
            .collect()
    }
}

/// The family shipped in `assets/fonts`.
pub const BUNDLED_FAMILY: FamilyFiles = FamilyFiles {
    name: "Roboto",
    regular: "Roboto-Regular.ttf",
    bold: "Roboto-Bold.ttf",
    italic: "Roboto-Italic.ttf",
    bold_italic: "Roboto-BoldItalic.ttf",
};

const SYSTEM_FAMILIES: &[(&str, FamilyFiles)] = &[
    (
        "/usr/share/fonts/truetype/liberation",
        FamilyFiles {
            name: "LiberationSans",
            regular: "LiberationSans-Regular.ttf",
            bold: "LiberationSans-Bold.ttf",
            italic: "LiberationSans-Italic.ttf",
            bold_italic: "LiberationSans-BoldItalic.ttf",
        },
    ),
    (
        "/usr/share/fonts/truetype/dejavu",
        FamilyFiles {
            name: "DejaVuSans",
            regular: "DejaVuSans.ttf",
            bold: "DejaVuSans-Bold.ttf",
            italic: "DejaVuSans-Oblique.ttf",
            bold_italic: "DejaVuSans-BoldOblique.ttf",
        },
    ),
];

const WINDOWS_FAMILY: FamilyFiles = FamilyFiles {
    name: "Arial",
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
};

/// A complete font family found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFonts {
    pub directory: PathBuf,
    pub family: FamilyFiles,
}

impl ResolvedFonts {
    fn path(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }

    /// Reads the regular face, e.g. for registering with a chart backend.
    pub fn regular_bytes(&self) -> Result<Vec<u8>, Error> {
        read_font(&self.path(self.family.regular), "regular")
    }

    /// Loads all four faces as a `genpdf` family.
    pub fn load_family(&self) -> Result<FontFamily<FontData>, Error> {
        let load = |file: &str, style: &str| -> Result<FontData, Error> {
            let path = self.path(file);
            let bytes = read_font(&path, style)?;
            FontData::new(bytes, None).map_err(|err| {
                Error::new(
                    format!("Failed to parse {} font at {}: {}", style, path.display(), err),
                    io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
                )
            })
        };

        Ok(FontFamily {
            regular: load(self.family.regular, "regular")?,
            bold: load(self.family.bold, "bold")?,
            italic: load(self.family.italic, "italic")?,
            bold_italic: load(self.family.bold_italic, "bold italic")?,
        })
    }
}

fn read_font(path: &Path, style: &str) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|err| {
        Error::new(
            format!("Failed to read {} font at {}", style, path.display()),
            err,
        )
    })
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).and_then(|value| {
        let path = PathBuf::from(value);
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    })
}

fn candidates(configured: Option<&Path>) -> Vec<(PathBuf, FamilyFiles)> {
    let mut bundled_dirs = Vec::new();
    if let Some(path) = configured {
        bundled_dirs.push(path.to_path_buf());
    }
    if let Some(path) = env_path(FONTS_DIR_ENV) {
        bundled_dirs.push(path);
    }
    if let Some(bin_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bundled_dirs.push(bin_dir.join("assets/fonts"));
    }
    bundled_dirs.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts"));

    let mut candidates: Vec<(PathBuf, FamilyFiles)> = Vec::new();
    for directory in bundled_dirs {
        if !candidates.iter().any(|(existing, _)| existing == &directory) {
            candidates.push((directory, BUNDLED_FAMILY));
        }
    }

    // A configured directory may hold any of the known families.
    if let Some(path) = configured {
        for (_, family) in SYSTEM_FAMILIES {
            candidates.push((path.to_path_buf(), *family));
        }
    }

    for (directory, family) in SYSTEM_FAMILIES {
        candidates.push((PathBuf::from(directory), *family));
    }

    for var in ["WINDIR", "SystemRoot"] {
        if let Some(root) = env_path(var) {
            candidates.push((root.join("Fonts"), WINDOWS_FAMILY));
        }
    }

    candidates
}

/// Finds the first complete font family.
///
/// `configured` is the fonts directory from the pipeline configuration, if any.
pub fn resolve_fonts(configured: Option<&Path>) -> Result<ResolvedFonts, Error> {
    let mut attempts = Vec::new();

    for (directory, family) in candidates(configured) {
        if !directory.is_dir() {
            attempts.push(format!("{} (directory missing)", directory.display()));
            continue;
        }

        let missing = family.missing_in(&directory);
        if missing.is_empty() {
            if family == BUNDLED_FAMILY {
                debug!("Using bundled fonts from {}", directory.display());
            } else {
                warn!(
                    "Bundled fonts unavailable; falling back to '{}' from {}",
                    family.name,
                    directory.display()
                );
            }
            return Ok(ResolvedFonts { directory, family });
        }

        attempts.push(format!(
            "{} ({} missing [{}])",
            directory.display(),
            family.name,
            missing.join(", ")
        ));
    }

    Err(Error::new(
        format!(
            "Unable to locate a usable font family. Checked: {}. Set {} to a directory holding the Roboto TTF files.",
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io::Error::new(io::ErrorKind::NotFound, "no font family found"),
    ))
}

/// Returns whether `err` means no fonts were found, as opposed to fonts that failed to parse.
pub fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Indicates whether any complete font family can be found.
pub fn fonts_available(configured: Option<&Path>) -> bool {
    resolve_fonts(configured).is_ok()
}
