#![allow(dead_code)]

/// A handful of public-domain poems in the local corpus file format.
pub const SAMPLE_POEMS_TOML: &str = r#"
[[poem]]
id = 10
title = "Ozymandias"
author = "Percy Bysshe Shelley"
lines = [
  "I met a traveller from an antique land,",
  "Who said - Two vast and trunkless legs of stone",
  "Stand in the desert. . . . Near them, on the sand,",
]

[[poem]]
id = 11
title = "Fire and Ice"
author = "Robert Frost"
lines = [
  "Some say the world will end in fire,",
  "Some say in ice.",
]

[[poem]]
id = 12
title = "Dust of Snow"
author = "Robert Frost"
lines = [
  "The way a crow",
  "Shook down on me",
  "The dust of snow",
  "From a hemlock tree",
]

[[poem]]
id = 13
title = "A Dream Within a Dream"
author = "Edgar Allan Poe"
body = """Take this kiss upon the brow!
And, in parting from you now,"""
"#;

pub fn write_corpus(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("poems.toml");
    std::fs::write(&path, SAMPLE_POEMS_TOML).expect("write sample corpus");
    path
}
