use crate::types::{Category, SourceDescriptor};

/// Feeds polled when no source file is given. Wire services and journals
/// carry a higher weight so they win dedup collisions against aggregators.
pub fn default_sources() -> Vec<SourceDescriptor> {
    vec![
        // Technology
        SourceDescriptor::new("TechCrunch", "https://techcrunch.com/feed/", Category::Tech, 2),
        SourceDescriptor::new("Wired", "https://www.wired.com/feed/rss", Category::Tech, 2),
        SourceDescriptor::new("Stack Overflow Blog", "https://stackoverflow.blog/feed/", Category::Tech, 1),
        SourceDescriptor::new("The Verge", "https://www.theverge.com/rss/index.xml", Category::Tech, 2),
        SourceDescriptor::new("TechRadar", "https://www.techradar.com/rss", Category::Tech, 1),
        SourceDescriptor::new("IT Home", "https://www.ithome.com/rss/", Category::Tech, 1),
        SourceDescriptor::new("ZDNet", "https://www.zdnet.com/news/rss.xml", Category::Tech, 1),
        SourceDescriptor::new("CNET", "https://www.cnet.com/rss/news/", Category::Tech, 1),
        SourceDescriptor::new("Leiphone", "https://www.leiphone.com/feed", Category::Tech, 1),
        SourceDescriptor::new("Meituan Tech", "https://tech.meituan.com/feed/", Category::Tech, 1),
        SourceDescriptor::new("Ars Technica", "https://feeds.arstechnica.com/arstechnica/index", Category::Tech, 2),
        SourceDescriptor::new("Engadget", "https://www.engadget.com/rss.xml", Category::Tech, 1),
        SourceDescriptor::new("Product Hunt", "https://www.producthunt.com/feed", Category::Tech, 1),
        // Science
        SourceDescriptor::new("Nature", "https://www.nature.com/nature.rss", Category::Science, 3),
        SourceDescriptor::new("New Scientist", "https://www.newscientist.com/feed/home", Category::Science, 2),
        SourceDescriptor::new("ScienceDaily", "https://www.sciencedaily.com/rss/all.xml", Category::Science, 1),
        SourceDescriptor::new("Science", "https://www.science.org/rss/current.xml", Category::Science, 3),
        SourceDescriptor::new("PLOS ONE", "https://journals.plos.org/plosone/feed/atom", Category::Science, 2),
        SourceDescriptor::new("Popular Science", "https://www.popsci.com/feed/", Category::Science, 1),
        SourceDescriptor::new("NASA", "https://www.nasa.gov/rss/dyn/breaking_news.rss", Category::Science, 3),
        // Society
        SourceDescriptor::new("BBC News", "https://feeds.bbci.co.uk/news/rss.xml", Category::Society, 3),
        // International
        SourceDescriptor::new("Al Jazeera", "https://www.aljazeera.com/xml/rss/all.xml", Category::International, 2),
        SourceDescriptor::new("BBC World", "https://www.bbc.com/news/rss.xml", Category::International, 3),
        SourceDescriptor::new("The Guardian World", "https://www.theguardian.com/world/rss", Category::International, 2),
        SourceDescriptor::new("NYT World", "https://www.nytimes.com/services/xml/rss/nyt/World.xml", Category::International, 3),
        SourceDescriptor::new("ProPublica", "https://www.propublica.org/feeds/propublica/main", Category::International, 2),
    ]
}
