use clap::ValueEnum;
use serde::Serialize;

/// Hardware class a recommended model is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

/// A downloadable GGUF model known to work with the quest prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedModel {
    pub tier: Tier,
    pub repo_id: &'static str,
    pub filename: &'static str,
    pub description: &'static str,
    pub requirements: &'static str,
}

const fn model(
    tier: Tier,
    repo_id: &'static str,
    filename: &'static str,
    description: &'static str,
    requirements: &'static str,
) -> RecommendedModel {
    RecommendedModel {
        tier,
        repo_id,
        filename,
        description,
        requirements,
    }
}

pub const RECOMMENDED: &[RecommendedModel] = &[
    // --- low ---
    model(
        Tier::Low,
        "microsoft/Phi-3-mini-4k-instruct-gguf",
        "Phi-3-mini-4k-instruct-q4.gguf",
        "3.8B model from Microsoft, strongest in its size class.",
        ">= 4GB VRAM or >= 8GB RAM (CPU)",
    ),
    model(
        Tier::Low,
        "google/gemma-2b-it-gguf",
        "gemma-2b-it.Q4_K_M.gguf",
        "2B instruction-tuned Gemma, good dialogue performance.",
        ">= 3GB VRAM or >= 8GB RAM (CPU)",
    ),
    model(
        Tier::Low,
        "lmstudio-ai/stablelm-2-zephyr-1_6b-GGUF",
        "stablelm-2-zephyr-1_6b-Q4_K_M.gguf",
        "Very compact 1.6B model for the weakest machines.",
        ">= 2GB VRAM or >= 8GB RAM (CPU)",
    ),
    // --- medium ---
    model(
        Tier::Medium,
        "meta-llama/Llama-3-8B-Instruct-GGUF",
        "Meta-Llama-3-8B-Instruct-Q4_K_M.gguf",
        "Llama 3 8B Instruct, one of the best models of its size.",
        ">= 8GB VRAM or >= 16GB RAM (CPU)",
    ),
    model(
        Tier::Medium,
        "mistralai/Mistral-7B-Instruct-v0.2-GGUF",
        "mistral-7b-instruct-v0.2.Q4_K_M.gguf",
        "Mistral 7B Instruct, fast and still very capable.",
        ">= 6GB VRAM or >= 16GB RAM (CPU)",
    ),
    model(
        Tier::Medium,
        "IlyaGusev/saiga_mistral_7b_gguf",
        "model-q4_K.gguf",
        "Saiga, Mistral 7B fine-tuned on Russian data. Often better for Russian quests.",
        ">= 6GB VRAM or >= 16GB RAM (CPU)",
    ),
    model(
        Tier::Medium,
        "google/gemma-7b-it-gguf",
        "gemma-7b-it.Q4_K_M.gguf",
        "Gemma 7B, a solid alternative to Llama and Mistral.",
        ">= 6GB VRAM or >= 16GB RAM (CPU)",
    ),
    // --- high ---
    model(
        Tier::High,
        "mistralai/Mixtral-8x7B-Instruct-v0.1-GGUF",
        "mixtral-8x7b-instruct-v0.1.Q4_K_M.gguf",
        "Mixture-of-experts model with near GPT-3.5/4 quality.",
        ">= 24GB VRAM or >= 48GB RAM (CPU)",
    ),
    model(
        Tier::High,
        "NousResearch/Nous-Hermes-2-Yi-34B-GGUF",
        "nous-hermes-2-yi-34b.Q5_K_M.gguf",
        "Strong 34B model for machines that cannot fit 70B.",
        ">= 24GB VRAM or >= 32GB RAM (CPU)",
    ),
    model(
        Tier::High,
        "meta-llama/Llama-3-70B-Instruct-GGUF",
        "Meta-Llama-3-70B-Instruct.Q3_K_M.gguf",
        "Llama 3 70B at Q3_K_M. For enthusiasts.",
        ">= 32GB VRAM or >= 64GB RAM (CPU)",
    ),
];

/// Recommended models, optionally limited to one tier.
pub fn recommended(tier: Option<Tier>) -> Vec<&'static RecommendedModel> {
    RECOMMENDED
        .iter()
        .filter(|m| tier.map_or(true, |t| m.tier == t))
        .collect()
}
