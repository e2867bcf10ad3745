//! Basic example demonstrating typed calls, raw decoding and streaming.
//!
//! This example shows how to:
//! - Declare a model and its wire shape
//! - Make GET and POST requests that coerce into the model
//! - Inspect response metadata (latency, attempts, redirects)
//! - Consume a JSON-Lines or event-stream response lazily
//!
//! Run with: `cargo run --example basic_call`

use futures::StreamExt;
use http::Method;
use restcore::coerce::{FieldShape, Model, Shape, StructShape};
use restcore::metadata::RequestMetadata;
use restcore::path::PathSpec;
use restcore::{Client, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Post {
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

const POST: StructShape = StructShape::new(
    "Post",
    &[
        FieldShape::required("user_id", Shape::Int).wire("userId"),
        FieldShape::required("id", Shape::Int),
        FieldShape::required("title", Shape::String),
        FieldShape::required("body", Shape::String),
    ],
);

impl Model for Post {
    const SHAPE: Shape = Shape::Struct(&POST);
}

#[derive(Debug, Serialize, Deserialize)]
struct NewPost {
    title: String,
    body: String,
    user_id: u32,
}

const NEW_POST: StructShape = StructShape::new(
    "NewPost",
    &[
        FieldShape::required("title", Shape::String),
        FieldShape::required("body", Shape::String),
        FieldShape::required("user_id", Shape::Int).wire("userId"),
    ],
);

impl Model for NewPost {
    const SHAPE: Shape = Shape::Struct(&NEW_POST);
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("restcore=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com/")?
        .max_retries(3)
        .build()?;

    println!("=== GET Request Example ===");
    let metadata = RequestMetadata::new(Method::GET, PathSpec::template("posts/%1$s", ["1"]));
    let response = client.request::<Post>(metadata).await?;

    println!("Post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!("Request latency: {:?}", response.latency);
    println!("Attempts: {}, redirects: {}", response.attempts, response.redirects);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created = client.post::<NewPost, Post>("posts", &new_post).await?;
    println!("Created post with ID: {}", created.data.id);
    println!();

    println!("=== Streaming Example ===");
    let mut posts = client
        .request_stream::<Post>(RequestMetadata::new(Method::GET, "posts").with_query_param("userId", 1))
        .await?
        .data;
    let mut count = 0;
    while let Some(post) = posts.next().await {
        let post = post?;
        count += 1;
        if count <= 3 {
            println!("- {}", post.title);
        }
    }
    println!("{} posts in total", count);

    Ok(())
}
