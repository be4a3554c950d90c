use std::fmt;

/// Команды управления подписками транспорта.
///
/// Одна пара функций маршрутизатора (подписка/отписка) обслуживает
/// и точные каналы, и шаблоны: различие передаётся этим тегом.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionCommand {
    Subscribe,
    PSubscribe,
    Unsubscribe,
    PUnsubscribe,
}

impl SubscriptionCommand {
    /// Имя команды на стороне транспорта.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::PSubscribe => "PSUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::PUnsubscribe => "PUNSUBSCRIBE",
        }
    }
}

impl fmt::Display for SubscriptionCommand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(SubscriptionCommand::PSubscribe.to_string(), "PSUBSCRIBE");
        assert_eq!(SubscriptionCommand::Unsubscribe.as_str(), "UNSUBSCRIBE");
    }
}
