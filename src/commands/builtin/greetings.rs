//! Commands anyone can run.

use async_trait::async_trait;

use crate::commands::{Command, CommandContext};
use crate::github::GitHubError;

const PARROT: &str = "![party parrot](http://cultofthepartyparrot.com/parrots/hd/parrot.gif)";
const PARROT_COUNT: usize = 10;

const ZEN: &str = "Zen of Python ([pep 20](https://www.python.org/dev/peps/pep-0020/))
```
>>> import this
Beautiful is better than ugly.
Explicit is better than implicit.
Simple is better than complex.
Complex is better than complicated.
Flat is better than nested.
Sparse is better than dense.
Readability counts.
Special cases aren't special enough to break the rules.
Although practicality beats purity.
Errors should never pass silently.
Unless explicitly silenced.
In the face of ambiguity, refuse the temptation to guess.
There should be one-- and preferably only one --obvious way to do it.
Although that way may not be obvious at first unless you're Dutch.
Now is better than never.
Although never is often better than *right* now.
If the implementation is hard to explain, it's a bad idea.
If the implementation is easy to explain, it may be a good idea.
Namespaces are one honking great idea -- let's do more of those!
```";

/// `hello`: greets the requester.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hello;

#[async_trait]
impl Command for Hello {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        context
            .reply(&format!(
                "Hello @{}! {} at your service.",
                context.requester(),
                context.bot_name
            ))
            .await
    }
}

/// `zen`: posts the Zen of Python.
#[derive(Debug, Default, Clone, Copy)]
pub struct Zen;

#[async_trait]
impl Command for Zen {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        context.reply(ZEN).await
    }
}

/// `party`: posts a row of parrots.
#[derive(Debug, Default, Clone, Copy)]
pub struct Party;

#[async_trait]
impl Command for Party {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        context.reply(&PARROT.repeat(PARROT_COUNT)).await
    }
}

/// `say`: repeats the argument text.
#[derive(Debug, Default, Clone, Copy)]
pub struct Say;

#[async_trait]
impl Command for Say {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let text = context.arguments();
        if text.is_empty() {
            tracing::debug!("say without arguments; nothing to post");
            return Ok(());
        }
        context.reply(text).await
    }
}
