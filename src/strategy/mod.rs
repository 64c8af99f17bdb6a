//! Tool and strategy selection
//!
//! Pure table lookup from (category, confidence) to a structured
//! recommendation: which tools to run first, which to fall back to, and a
//! phased analysis strategy with focus topics. No filesystem access — the
//! tables are static reference data, checked exhaustively at compile time
//! over the closed `Category` set.

use serde::{Deserialize, Serialize};

use crate::classify::{Category, Confidence};

// ─── Plan Types ─────────────────────────────────────────────────────

/// One invocable analysis tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Executable name
    pub command: String,
    /// Argument template; `{apk_path}`, `{output_dir}`, `{bundle_path}` and
    /// `{package_name}` are substituted by the operator
    pub args: Vec<String>,
    pub output_type: String,
    /// Lower runs first
    pub priority: u32,
}

/// One phase of the recommended analysis approach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPhase {
    pub name: String,
    pub description: String,
    pub tools: Vec<String>,
    pub focus: Vec<String>,
}

/// A shell-level command recipe grouped under a named task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecipe {
    pub task: String,
    pub commands: Vec<String>,
}

/// Complete recommendation for one classification outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub category: Category,
    pub confidence: Confidence,
    pub primary_tools: Vec<ToolDescriptor>,
    pub fallback_tools: Vec<ToolDescriptor>,
    pub phases: Vec<AnalysisPhase>,
    pub priority_locations: Vec<String>,
    pub tool_commands: Vec<CommandRecipe>,
    pub expected_artifacts: Vec<String>,
}

// ─── Selection ──────────────────────────────────────────────────────

/// Select the analysis strategy for a classified application.
///
/// Low confidence widens the fallback set to secondary ∪ specialized tools;
/// otherwise only secondary tools are recommended as fallbacks.
pub fn select_strategy(category: Category, confidence: Confidence) -> StrategyPlan {
    let sets = tool_sets(category);

    let primary_tools = resolve_tools(sets.primary);
    let fallback_names: Vec<&str> = if confidence == Confidence::Low {
        sets.secondary.iter().chain(sets.specialized).copied().collect()
    } else {
        sets.secondary.to_vec()
    };
    let fallback_tools = resolve_tools(&fallback_names);

    let (phases, priority_locations) = analysis_strategy(category);

    StrategyPlan {
        category,
        confidence,
        primary_tools,
        fallback_tools,
        phases,
        priority_locations,
        tool_commands: tool_commands(category),
        expected_artifacts: expected_artifacts(category),
    }
}

struct ToolSets {
    primary: &'static [&'static str],
    secondary: &'static [&'static str],
    #[allow(dead_code)]
    dynamic: &'static [&'static str],
    specialized: &'static [&'static str],
}

fn tool_sets(category: Category) -> ToolSets {
    match category {
        Category::NativeAndroid => ToolSets {
            primary: &["jadx", "apktool", "strings"],
            secondary: &["dex2jar", "jd-gui", "aapt"],
            dynamic: &["frida", "objection"],
            specialized: &["mobsf", "classyshark"],
        },
        Category::Flutter => ToolSets {
            primary: &["jadx", "apktool", "reFlutter", "blutter"],
            secondary: &["dart_analyzer", "flutter_tools"],
            dynamic: &["frida", "reFlutter"],
            specialized: &["doldrums", "snapshot_analyzer"],
        },
        Category::ReactNative => ToolSets {
            primary: &["jadx", "apktool", "js-beautify"],
            secondary: &["hermes-dec", "metro-symbolicate"],
            dynamic: &["frida", "flipper", "reactotron"],
            specialized: &["react-native-decompiler"],
        },
        Category::Xamarin => ToolSets {
            primary: &["jadx", "apktool", "ildasm"],
            secondary: &["dotnet-decompiler", "reflexil"],
            dynamic: &["frida"],
            specialized: &["xamarin-analyzer"],
        },
        Category::Cordova => ToolSets {
            primary: &["jadx", "apktool"],
            secondary: &["js-beautify", "html-analyzer"],
            dynamic: &["frida", "chrome-devtools"],
            specialized: &["cordova-analyzer"],
        },
        Category::Unity => ToolSets {
            primary: &["jadx", "apktool", "unity-studio"],
            secondary: &["il2cpp-dumper", "unity-assets-extractor"],
            dynamic: &["frida", "cheat-engine"],
            specialized: &["unity-analyzer", "asset-bundle-extractor"],
        },
    }
}

/// Resolve tool names against the descriptor table; names without a
/// descriptor are advisory-only and silently skipped
fn resolve_tools(names: &[&str]) -> Vec<ToolDescriptor> {
    names.iter().filter_map(|n| tool_info(n)).collect()
}

fn tool_info(name: &str) -> Option<ToolDescriptor> {
    let t = |name: &str, description: &str, command: &str, args: &[&str], output_type: &str, priority: u32| {
        ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            output_type: output_type.to_string(),
            priority,
        }
    };

    match name {
        "jadx" => Some(t(
            "jadx",
            "Java decompiler for Android APKs",
            "jadx",
            &["-d", "{output_dir}", "{apk_path}"],
            "source_code",
            1,
        )),
        "apktool" => Some(t(
            "apktool",
            "Tool for reverse engineering Android APK files",
            "apktool",
            &["d", "{apk_path}", "-o", "{output_dir}", "-f"],
            "resources_smali",
            1,
        )),
        "strings" => Some(t(
            "strings",
            "Extract strings from binary files",
            "strings",
            &["{apk_path}"],
            "text_strings",
            2,
        )),
        "reFlutter" => Some(t(
            "reFlutter",
            "Flutter app patching and analysis tool",
            "python3",
            &["reFlutter.py", "{apk_path}"],
            "patched_apk",
            1,
        )),
        "blutter" => Some(t(
            "blutter",
            "Flutter bytecode analysis tool",
            "blutter",
            &["{apk_path}", "{output_dir}"],
            "dart_analysis",
            1,
        )),
        "js-beautify" => Some(t(
            "js-beautify",
            "JavaScript beautifier and formatter",
            "js-beautify",
            &["{bundle_path}"],
            "formatted_js",
            2,
        )),
        "hermes-dec" => Some(t(
            "hermes-dec",
            "Hermes bytecode decompiler",
            "hermes-dec",
            &["{bundle_path}", "-o", "{output_dir}"],
            "decompiled_js",
            1,
        )),
        "frida" => Some(t(
            "frida",
            "Dynamic instrumentation framework",
            "frida",
            &["-U", "-f", "{package_name}"],
            "runtime_analysis",
            3,
        )),
        _ => None,
    }
}

fn phase(name: &str, description: &str, tools: &[&str], focus: &[&str]) -> AnalysisPhase {
    AnalysisPhase {
        name: name.to_string(),
        description: description.to_string(),
        tools: tools.iter().map(|s| s.to_string()).collect(),
        focus: focus.iter().map(|s| s.to_string()).collect(),
    }
}

fn analysis_strategy(category: Category) -> (Vec<AnalysisPhase>, Vec<String>) {
    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    match category {
        Category::NativeAndroid => (
            vec![
                phase(
                    "Static Analysis",
                    "Decompile and analyze source code",
                    &["jadx", "apktool"],
                    &["API endpoints", "hardcoded strings", "network configs"],
                ),
                phase(
                    "Resource Analysis",
                    "Analyze app resources and manifest",
                    &["apktool", "aapt"],
                    &["strings.xml", "network_security_config", "permissions"],
                ),
                phase(
                    "Security Analysis",
                    "Look for security vulnerabilities",
                    &["strings", "grep"],
                    &["credentials", "keys", "certificates"],
                ),
            ],
            strings(&[
                "smali files for bytecode analysis",
                "Java source for API calls",
                "strings.xml for configuration",
                "AndroidManifest.xml for permissions",
            ]),
        ),
        Category::Flutter => (
            vec![
                phase(
                    "Asset Analysis",
                    "Analyze Flutter assets and configuration",
                    &["apktool"],
                    &["flutter_assets", "AssetManifest.json", "config files"],
                ),
                phase(
                    "Dart Analysis",
                    "Analyze Dart bytecode and snapshots",
                    &["blutter", "reFlutter"],
                    &["VM snapshots", "widget trees", "business logic"],
                ),
                phase(
                    "Native Bridge Analysis",
                    "Analyze platform channel implementations",
                    &["jadx"],
                    &["platform channels", "native plugins"],
                ),
            ],
            strings(&[
                "flutter_assets/ for configurations",
                "VM snapshots for business logic",
                "lib/ directories for native code",
                "AssetManifest.json for resource mapping",
            ]),
        ),
        Category::ReactNative => (
            vec![
                phase(
                    "Bundle Analysis",
                    "Analyze JavaScript bundles",
                    &["js-beautify", "hermes-dec"],
                    &["API calls", "component structure", "state management"],
                ),
                phase(
                    "Bridge Analysis",
                    "Analyze React Native bridge",
                    &["jadx"],
                    &["native modules", "bridge communication"],
                ),
                phase(
                    "Asset Analysis",
                    "Analyze app assets and resources",
                    &["apktool"],
                    &["bundle files", "assets", "configurations"],
                ),
            ],
            strings(&[
                "assets/index.android.bundle for main code",
                "Native modules for bridge implementations",
                "lib/ directories for React Native runtime",
                "Source maps if available",
            ]),
        ),
        // Xamarin, Cordova and Unity share the universal fallback approach
        Category::Xamarin | Category::Cordova | Category::Unity => (
            vec![phase(
                "Universal Analysis",
                "Generic analysis approach",
                &["jadx", "apktool", "strings"],
                &["any HTTP URLs", "configuration files", "string resources"],
            )],
            strings(&[
                "Any text-based files",
                "Configuration files",
                "Resource directories",
                "Binary string extraction",
            ]),
        ),
    }
}

fn recipe(task: &str, commands: &[&str]) -> CommandRecipe {
    CommandRecipe {
        task: task.to_string(),
        commands: commands.iter().map(|s| s.to_string()).collect(),
    }
}

fn tool_commands(category: Category) -> Vec<CommandRecipe> {
    match category {
        Category::Flutter => vec![
            recipe(
                "asset_analysis",
                &[
                    "unzip {apk_path} 'flutter_assets/*'",
                    "find flutter_assets/ -name '*.json' -exec cat {} \\;",
                    "strings flutter_assets/* | grep -E 'https?://'",
                ],
            ),
            recipe(
                "blutter_analysis",
                &[
                    "blutter {apk_path} {blutter_output}",
                    "grep -r 'http' {blutter_output}/",
                ],
            ),
        ],
        Category::ReactNative => vec![
            recipe(
                "bundle_extraction",
                &[
                    "unzip {apk_path} assets/index.android.bundle",
                    "js-beautify assets/index.android.bundle > readable.js",
                    "grep -E 'https?://' readable.js",
                ],
            ),
            recipe(
                "hermes_analysis",
                &[
                    "hermes-dec assets/index.android.bundle -o {hermes_output}",
                    "grep -r 'fetch\\|axios' {hermes_output}/",
                ],
            ),
        ],
        // Every other category uses the native recipes
        Category::NativeAndroid | Category::Xamarin | Category::Cordova | Category::Unity => vec![
            recipe(
                "jadx_analysis",
                &[
                    "jadx -d {jadx_output} {apk_path}",
                    "find {jadx_output} -name '*.java' -exec grep -l 'http' {} \\;",
                ],
            ),
            recipe(
                "apktool_analysis",
                &[
                    "apktool d {apk_path} -o {apktool_output} -f",
                    "grep -r 'http' {apktool_output}/res/values/",
                    "grep -r 'api\\|endpoint' {apktool_output}/",
                ],
            ),
            recipe(
                "string_extraction",
                &[
                    "strings {apk_path} | grep -E 'https?://'",
                    "strings {apktool_output}/resources.arsc | grep -E 'https?://'",
                ],
            ),
        ],
    }
}

fn expected_artifacts(category: Category) -> Vec<String> {
    let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match category {
        Category::NativeAndroid => strings(&[
            "Decompiled Java/Kotlin source code",
            "Android resources and layouts",
            "Manifest with permissions and components",
            "String resources with potential URLs",
            "Network security configurations",
            "Obfuscated code patterns",
        ]),
        Category::Flutter => strings(&[
            "Flutter assets and configurations",
            "Dart VM snapshots",
            "Widget composition trees",
            "Platform channel implementations",
            "Asset manifest mappings",
            "Plugin configurations",
        ]),
        Category::ReactNative => strings(&[
            "JavaScript bundle files",
            "React component definitions",
            "API service definitions",
            "Navigation structures",
            "State management patterns",
            "Native module interfaces",
        ]),
        Category::Xamarin => strings(&[
            ".NET assemblies",
            "Mono runtime configurations",
            "Cross-platform abstractions",
            "Platform-specific implementations",
        ]),
        Category::Cordova => strings(&[
            "HTML/JavaScript web content",
            "Cordova plugin configurations",
            "WebView bridge implementations",
            "Plugin manifest files",
        ]),
        Category::Unity => strings(&[
            "Unity asset bundles",
            "Game object hierarchies",
            "Script assemblies",
            "Resource asset mappings",
        ]),
    }
}
