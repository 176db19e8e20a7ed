//! Architecture document templates

/// How the Architect must lay out the build phases
pub const PLAN_FORMAT_INSTRUCTIONS: &str = r#"## Build Phases

End the architecture document with a `## Build Phases` section. Each phase is
small enough for one Builder pass and leaves the project in a working state.

Use exactly this shape for every phase:

### Phase 1: <Name>
Goal: <one sentence describing the observable outcome>
- <task>
- <task>

Append `(Milestone)` to the heading of phases that complete a user-visible
slice of the product. Milestones get the full visual and design review; keep
them to roughly one in three phases.
"#;

/// A small architecture document used in examples and tests
pub fn example_architecture() -> String {
    r#"# Architecture: Recipe Box

## Overview
A single-page app for saving and sharing recipes.

## Tech Stack
- Vite + React + TypeScript
- Tailwind CSS
- Vitest

## Build Phases

### Phase 1: App Shell (Milestone)
Goal: Navigable skeleton with routing and layout
- Root layout with header
- Client-side routing

### Phase 2: Data Layer
**Goal:** Recipe storage with local persistence
- Recipe model and validation
- localStorage repository

### Phase 3: Recipe Editor (Milestone)
Goal: Create and edit recipes
- Editor form
- Ingredient list component
"#
    .to_string()
}
