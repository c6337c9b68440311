//! Prompt assembly for the generative fallback

use crate::config::Links;
use crate::intent::Intent;
use crate::knowledge::CacheMatch;
use crate::language::Language;
use crate::providers::CompletionRequest;

/// Builds the system instruction, the per-intent goal and the user turn
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    links: Links,
    max_output_tokens: u32,
}

impl PromptBuilder {
    pub fn new(links: Links, max_output_tokens: u32) -> Self {
        Self {
            links,
            max_output_tokens,
        }
    }

    /// Fixed instruction: tone, policy and the fact sheet
    pub fn system_prompt(&self) -> String {
        let l = &self.links;
        format!(
            "You are the Curevia assistant on curevia.ai, a marketplace that matches healthcare \
providers with licensed clinicians. Answer briefly and clearly in two or three sentences, in a warm \
and reassuring tone. If the question is unclear, ask for a clarification in one sentence.

Policy:
- Never handle personal identity numbers or medical record details. Stop and refer to a secure contact channel.
- Give no medical advice in the chat.
- Insurance is provided by the healthcare provider, not by Curevia.
- When unsure, offer to book a demo ({demo}).

Goals:
- Consultants and clinicians: guide towards registration ({reg_consultant}).
- Healthcare providers: guide towards registration ({reg_provider}) or a demo ({demo}).
- Highlight direct matching without middlemen and that CVs and ratings from earlier assignments are visible.
- Trying is free and the first three assignments each year cost nothing; after that a low fee applies.

Facts:
- Consultants do not need their own company; they can be paid through Curevia or invoice through their own company.
- Payment through Curevia is made automatically once the provider has paid Curevia. With their own company the consultant invoices, usually with 30 days terms.
- If a provider pays late, Curevia takes the matter to debt collection.
- Pricing for providers: {pricing}.
- Onboarding: create an assignment and choose among interested consultants; a dedicated account manager follows up.
- For compensation questions, offer the net salary calculator and show the steps (fee, employer contributions, tax, net).",
            demo = l.demo,
            reg_consultant = l.register_consultant,
            reg_provider = l.register_provider,
            pricing = l.pricing,
        )
    }

    /// Conversation goal for the classified intent
    pub fn goal(&self, intent: Intent) -> String {
        let l = &self.links;
        match intent {
            Intent::ProviderTopic | Intent::RegisterProvider | Intent::BookDemo => format!(
                "GOAL: lead the healthcare provider to book a demo ({}) or register ({}).",
                l.demo, l.register_provider
            ),
            Intent::ConsultantTopic | Intent::RegisterConsultant => format!(
                "GOAL: lead the consultant or clinician to register ({}).",
                l.register_consultant
            ),
            _ => format!("GOAL: if unsure, suggest a demo ({}).", l.demo),
        }
    }

    /// Complete request for one utterance
    pub fn build(
        &self,
        utterance: &str,
        intent: Intent,
        lang: Language,
        references: &[CacheMatch],
    ) -> CompletionRequest {
        let mut system = self.system_prompt();
        system.push_str("\n\n");
        system.push_str(&self.goal(intent));
        system.push_str(&format!(
            "\n\nAlways answer in {} ({}), whatever language the question is in.",
            lang.english_name(),
            lang.native_name()
        ));

        let mut user = String::new();
        if !references.is_empty() {
            user.push_str("Reference answers to similar earlier questions:\n");
            for (i, r) in references.iter().enumerate() {
                user.push_str(&format!(
                    "[{}] Q: {}\n    A: {}\n",
                    i + 1,
                    r.entry.question,
                    r.entry.answer
                ));
            }
            user.push('\n');
        }
        user.push_str("Visitor question: ");
        user.push_str(utterance);

        CompletionRequest {
            system_prompt: system,
            user_prompt: user,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeEntry;

    #[test]
    fn test_goal_follows_intent() {
        let builder = PromptBuilder::new(Links::default(), 220);
        assert!(builder
            .goal(Intent::ConsultantTopic)
            .contains(&Links::default().register_consultant));
        assert!(builder.goal(Intent::General).contains(&Links::default().demo));
    }

    #[test]
    fn test_request_carries_language_and_references() {
        let builder = PromptBuilder::new(Links::default(), 220);
        let reference = CacheMatch {
            entry: KnowledgeEntry {
                id: 1,
                language: Language::Da,
                question: "Hvad koster det?".into(),
                answer: "Det er gratis at prøve.".into(),
                embedding: vec![1.0],
                votes: 0,
                last_used_at: 0,
            },
            similarity: 0.7,
        };
        let request = builder.build("Er det dyrt?", Intent::General, Language::Da, &[reference]);

        assert!(request.system_prompt.contains("Danish"));
        assert!(request.user_prompt.contains("Det er gratis at prøve."));
        assert!(request.user_prompt.ends_with("Visitor question: Er det dyrt?"));
        assert_eq!(request.max_output_tokens, 220);
    }
}
