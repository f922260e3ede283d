//! Embed a few finance sentences with the default local model

use finsight_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EmbedConfig::default().with_batch_size(2);
    println!("Model: {} (batch size {})", config.model_name, config.batch_size);

    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Provider {} ready, dimension {}",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "Compound interest is interest on interest.".to_string(),
        "A mutual fund pools money from many investors.".to_string(),
        "Phishing calls often impersonate bank staff.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    for (text, embedding) in texts.iter().zip(result.embeddings.iter()) {
        println!("{text}");
        println!("  first values: {:?}", &embedding[..3.min(embedding.len())]);
    }

    Ok(())
}
