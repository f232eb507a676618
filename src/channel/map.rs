use std::collections::HashMap;

use tracing::{debug, warn};

use super::{Channel, CHANNEL_COUNT};
use crate::config::TopicBinding;

/// Lookup between bus topics and channels, built once from the configured topics
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    toggle_index: HashMap<String, Channel>,
    status_topics: Vec<String>,
}

impl ChannelMap {
    pub fn new(binding: &TopicBinding) -> Self {
        if binding.toggle_topics.len() > CHANNEL_COUNT {
            warn!(
                "{} toggle topics configured, only the first {} are bridged",
                binding.toggle_topics.len(),
                CHANNEL_COUNT
            );
        }

        let mut toggle_index = HashMap::new();
        for (index, topic) in binding.toggle_topics.iter().enumerate() {
            let Some(channel) = Channel::from_index(index) else {
                break;
            };
            if toggle_index.insert(topic.clone(), channel).is_some() {
                warn!("Toggle topic {} configured twice, using {}", topic, channel);
            }
            debug!("{} toggled by {}", channel, topic);
        }

        let status_topics = binding
            .status_topics
            .iter()
            .take(CHANNEL_COUNT)
            .cloned()
            .collect();

        Self {
            toggle_index,
            status_topics,
        }
    }

    pub fn channel_for_toggle_topic(&self, topic: &str) -> Option<Channel> {
        self.toggle_index.get(topic).copied()
    }

    pub fn status_topic_for_channel(&self, channel: Channel) -> Option<&str> {
        self.status_topics.get(channel.index()).map(String::as_str)
    }

    /// Toggle topics in channel order
    pub fn toggle_topics(&self) -> Vec<(&str, Channel)> {
        let mut topics: Vec<(&str, Channel)> = self
            .toggle_index
            .iter()
            .map(|(topic, channel)| (topic.as_str(), *channel))
            .collect();
        topics.sort_by_key(|(_, channel)| *channel);
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn binding(count: usize) -> TopicBinding {
        TopicBinding {
            toggle_topics: (1..=count).map(|n| format!("room{n}/toggle")).collect(),
            status_topics: (1..=count).map(|n| format!("room{n}/status")).collect(),
        }
    }

    #[test]
    fn lookups_are_one_based() {
        let map = ChannelMap::new(&binding(3));

        assert_eq!(map.channel_for_toggle_topic("room1/toggle"), Channel::new(1));
        assert_eq!(map.channel_for_toggle_topic("room3/toggle"), Channel::new(3));
        assert_eq!(
            map.status_topic_for_channel(Channel::new(2).unwrap()),
            Some("room2/status")
        );
    }

    #[test]
    fn unknown_topics_and_unbound_channels_resolve_to_none() {
        let map = ChannelMap::new(&binding(2));

        assert_eq!(map.channel_for_toggle_topic("room9/toggle"), None);
        assert_eq!(map.channel_for_toggle_topic(""), None);
        assert_eq!(map.status_topic_for_channel(Channel::new(3).unwrap()), None);
    }

    #[test]
    fn topics_beyond_eight_channels_are_ignored() {
        let map = ChannelMap::new(&binding(10));

        assert_eq!(map.channel_for_toggle_topic("room9/toggle"), None);
        assert_eq!(map.toggle_topics().len(), CHANNEL_COUNT);
        assert_eq!(map.toggle_topics()[0], ("room1/toggle", Channel::new(1).unwrap()));
    }

    #[test]
    fn terse_and_direct_forms_map_identically() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let terse = format!(
            "[General]\nmqttHost = \"h\"\n[Topics]\ntopicBase = \"base\"\n{}",
            names
                .iter()
                .enumerate()
                .map(|(i, name)| format!("topic-{} = \"{name}\"\n", i + 1))
                .collect::<String>()
        );
        let quoted = |endpoint: &str| {
            names
                .iter()
                .map(|name| format!("\"base/{name}/{endpoint}\""))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let direct = format!(
            "[General]\nmqttHost = \"h\"\ntoggleTopics = [{}]\nstatusTopics = [{}]\n",
            quoted("toggle"),
            quoted("status")
        );

        let terse = ChannelMap::new(&Config::from_toml_str(&terse).unwrap().topics);
        let direct = ChannelMap::new(&Config::from_toml_str(&direct).unwrap().topics);

        for channel in Channel::all() {
            let status = terse.status_topic_for_channel(channel).unwrap();
            assert_eq!(direct.status_topic_for_channel(channel), Some(status));

            let toggle = status.replace("/status", "/toggle");
            assert_eq!(terse.channel_for_toggle_topic(&toggle), Some(channel));
            assert_eq!(direct.channel_for_toggle_topic(&toggle), Some(channel));
        }
    }
}
