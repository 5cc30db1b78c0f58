use serde::{Deserialize, Serialize};

/// Operating system whose path conventions apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Install family, which decides the on-disk layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// VS Code derivatives: storage.json, state.vscdb, machineid
    Editor,
    /// Config directory plus PermanentDeviceId / PermanentUserId
    JetBrains,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Editor => write!(f, "editor"),
            Family::JetBrains => write!(f, "jetbrains"),
        }
    }
}

/// Every supported product. Declaration order is detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    VsCode,
    VsCodeInsiders,
    VsCodium,
    Cursor,
    CodeOss,
    Windsurf,
    IntelliJIdea,
    PyCharm,
    WebStorm,
    PhpStorm,
    RubyMine,
    CLion,
    DataGrip,
    GoLand,
    Rider,
    AndroidStudio,
}

/// Static description of a product's layout and binaries
#[derive(Debug)]
pub struct ProductSpec {
    pub product: Product,
    pub slug: &'static str,
    pub display_name: &'static str,
    pub family: Family,
    /// Editor family: config directory names under the user config root.
    /// JetBrains family: directory-name prefixes under `config_vendor`.
    pub config_dirs: &'static [&'static str],
    /// JetBrains family: vendor directory under the user config root
    pub config_vendor: Option<&'static str>,
    /// Process names (without `.exe`) that belong to this product
    pub process_names: &'static [&'static str],
    /// Launcher commands looked up on PATH
    pub launchers: &'static [&'static str],
    /// Install locations relative to %LOCALAPPDATA%\Programs (Windows)
    pub windows_install: &'static [&'static str],
    /// Bundle executables relative to an Applications folder (macOS)
    pub macos_bundle: &'static [&'static str],
}

const REGISTRY: &[ProductSpec] = &[
    ProductSpec {
        product: Product::VsCode,
        slug: "vscode",
        display_name: "VS Code",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["Code"],
        process_names: &["code", "Code"],
        launchers: &["code"],
        windows_install: &["Microsoft VS Code/Code.exe"],
        macos_bundle: &["Visual Studio Code.app/Contents/MacOS/Electron"],
    },
    ProductSpec {
        product: Product::VsCodeInsiders,
        slug: "vscode-insiders",
        display_name: "VS Code Insiders",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["Code - Insiders"],
        process_names: &["code-insiders", "Code - Insiders"],
        launchers: &["code-insiders"],
        windows_install: &["Microsoft VS Code Insiders/Code - Insiders.exe"],
        macos_bundle: &["Visual Studio Code - Insiders.app/Contents/MacOS/Electron"],
    },
    ProductSpec {
        product: Product::VsCodium,
        slug: "vscodium",
        display_name: "VSCodium",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["VSCodium", "Codium"],
        process_names: &["codium", "vscodium", "VSCodium"],
        launchers: &["codium", "vscodium"],
        windows_install: &["VSCodium/VSCodium.exe"],
        macos_bundle: &["VSCodium.app/Contents/MacOS/Electron"],
    },
    ProductSpec {
        product: Product::Cursor,
        slug: "cursor",
        display_name: "Cursor",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["Cursor"],
        process_names: &["cursor", "Cursor"],
        launchers: &["cursor"],
        windows_install: &["cursor/Cursor.exe"],
        macos_bundle: &["Cursor.app/Contents/MacOS/Cursor"],
    },
    ProductSpec {
        product: Product::CodeOss,
        slug: "code-oss",
        display_name: "Code - OSS",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["Code - OSS", "code-oss"],
        process_names: &["code-oss"],
        launchers: &["code-oss"],
        windows_install: &[],
        macos_bundle: &["Code - OSS.app/Contents/MacOS/Electron"],
    },
    ProductSpec {
        product: Product::Windsurf,
        slug: "windsurf",
        display_name: "Windsurf",
        family: Family::Editor,
        config_vendor: None,
        config_dirs: &["Windsurf"],
        process_names: &["windsurf", "Windsurf"],
        launchers: &["windsurf"],
        windows_install: &["Windsurf/Windsurf.exe"],
        macos_bundle: &["Windsurf.app/Contents/MacOS/Electron"],
    },
    ProductSpec {
        product: Product::IntelliJIdea,
        slug: "intellij-idea",
        display_name: "IntelliJ IDEA",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["IntelliJIdea", "IdeaIC"],
        process_names: &["idea", "idea64"],
        launchers: &["idea"],
        windows_install: &[],
        macos_bundle: &["IntelliJ IDEA.app/Contents/MacOS/idea"],
    },
    ProductSpec {
        product: Product::PyCharm,
        slug: "pycharm",
        display_name: "PyCharm",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["PyCharm"],
        process_names: &["pycharm", "pycharm64"],
        launchers: &["pycharm"],
        windows_install: &[],
        macos_bundle: &["PyCharm.app/Contents/MacOS/pycharm"],
    },
    ProductSpec {
        product: Product::WebStorm,
        slug: "webstorm",
        display_name: "WebStorm",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["WebStorm"],
        process_names: &["webstorm", "webstorm64"],
        launchers: &["webstorm"],
        windows_install: &[],
        macos_bundle: &["WebStorm.app/Contents/MacOS/webstorm"],
    },
    ProductSpec {
        product: Product::PhpStorm,
        slug: "phpstorm",
        display_name: "PhpStorm",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["PhpStorm"],
        process_names: &["phpstorm", "phpstorm64"],
        launchers: &["phpstorm"],
        windows_install: &[],
        macos_bundle: &["PhpStorm.app/Contents/MacOS/phpstorm"],
    },
    ProductSpec {
        product: Product::RubyMine,
        slug: "rubymine",
        display_name: "RubyMine",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["RubyMine"],
        process_names: &["rubymine", "rubymine64"],
        launchers: &["rubymine"],
        windows_install: &[],
        macos_bundle: &["RubyMine.app/Contents/MacOS/rubymine"],
    },
    ProductSpec {
        product: Product::CLion,
        slug: "clion",
        display_name: "CLion",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["CLion"],
        process_names: &["clion", "clion64"],
        launchers: &["clion"],
        windows_install: &[],
        macos_bundle: &["CLion.app/Contents/MacOS/clion"],
    },
    ProductSpec {
        product: Product::DataGrip,
        slug: "datagrip",
        display_name: "DataGrip",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["DataGrip"],
        process_names: &["datagrip", "datagrip64"],
        launchers: &["datagrip"],
        windows_install: &[],
        macos_bundle: &["DataGrip.app/Contents/MacOS/datagrip"],
    },
    ProductSpec {
        product: Product::GoLand,
        slug: "goland",
        display_name: "GoLand",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["GoLand"],
        process_names: &["goland", "goland64"],
        launchers: &["goland"],
        windows_install: &[],
        macos_bundle: &["GoLand.app/Contents/MacOS/goland"],
    },
    ProductSpec {
        product: Product::Rider,
        slug: "rider",
        display_name: "Rider",
        family: Family::JetBrains,
        config_vendor: Some("JetBrains"),
        config_dirs: &["Rider"],
        process_names: &["rider", "rider64"],
        launchers: &["rider"],
        windows_install: &[],
        macos_bundle: &["Rider.app/Contents/MacOS/rider"],
    },
    ProductSpec {
        product: Product::AndroidStudio,
        slug: "android-studio",
        display_name: "Android Studio",
        family: Family::JetBrains,
        config_vendor: Some("Google"),
        config_dirs: &["AndroidStudio"],
        process_names: &["studio", "studio64"],
        launchers: &["studio"],
        windows_install: &[],
        macos_bundle: &["Android Studio.app/Contents/MacOS/studio"],
    },
];

impl Product {
    /// All products in detection order
    pub fn all() -> impl Iterator<Item = Product> {
        REGISTRY.iter().map(|spec| spec.product)
    }

    pub fn spec(self) -> &'static ProductSpec {
        REGISTRY
            .iter()
            .find(|spec| spec.product == self)
            .unwrap_or(&REGISTRY[0])
    }

    pub fn slug(self) -> &'static str {
        self.spec().slug
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn family(self) -> Family {
        self.spec().family
    }

    /// Resolve a slug, display name, or config directory name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Product> {
        let wanted = name.trim();
        REGISTRY
            .iter()
            .find(|spec| {
                spec.slug.eq_ignore_ascii_case(wanted)
                    || spec.display_name.eq_ignore_ascii_case(wanted)
                    || spec.config_dirs.iter().any(|d| d.eq_ignore_ascii_case(wanted))
            })
            .map(|spec| spec.product)
    }

    /// Whether a running process name belongs to this product
    pub fn matches_process(self, process_name: &str) -> bool {
        let name = process_name
            .strip_suffix(".exe")
            .or_else(|| process_name.strip_suffix(".EXE"))
            .unwrap_or(process_name);
        self.spec()
            .process_names
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_variant() {
        let all: Vec<Product> = Product::all().collect();
        assert_eq!(all.len(), REGISTRY.len());
        for product in &all {
            assert_eq!(product.spec().product, *product);
        }
    }

    #[test]
    fn test_slugs_and_names_unique() {
        let mut slugs: Vec<&str> = REGISTRY.iter().map(|s| s.slug).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), REGISTRY.len());

        let mut names: Vec<&str> = REGISTRY.iter().map(|s| s.display_name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), REGISTRY.len());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Product::from_name("vs code"), Some(Product::VsCode));
        assert_eq!(Product::from_name("CURSOR"), Some(Product::Cursor));
        assert_eq!(Product::from_name("code-oss"), Some(Product::CodeOss));
        assert_eq!(Product::from_name("pycharm"), Some(Product::PyCharm));
        assert_eq!(Product::from_name("notepad"), None);
    }

    #[test]
    fn test_process_matching() {
        assert!(Product::VsCode.matches_process("Code.exe"));
        assert!(Product::VsCode.matches_process("code"));
        assert!(!Product::VsCode.matches_process("code-insiders"));
        assert!(Product::IntelliJIdea.matches_process("idea64.exe"));
        assert!(!Product::Cursor.matches_process("cursord"));
    }

    #[test]
    fn test_families() {
        assert_eq!(Product::VsCodium.family(), Family::Editor);
        assert_eq!(Product::Rider.family(), Family::JetBrains);
    }
}
