//! Routing of decoded commands to the storefront.

use common::{ChatId, UserId};
use shop::{AccessPolicy, Actor, Shop, ShopError};
use store::{Order, ShopStore};

use crate::command::{Command, InboundEvent};
use crate::config::Config;
use crate::error::BotError;
use crate::gateway::ChatGateway;
use crate::notifier::ChatNotifier;
use crate::reply::{self, Button, Reply};
use crate::session::{FormProgress, ProductForm, Session, Sessions, validate_phone};

type Result<T> = std::result::Result<T, BotError>;

/// Who sent the update and where to answer.
struct Context {
    chat_id: ChatId,
    actor: Actor,
    display_name: Option<String>,
}

impl Context {
    fn user_id(&self) -> UserId {
        self.actor.user_id
    }

    fn reply(&self, text: impl Into<String>) -> Reply {
        Reply::text(self.chat_id, text)
    }
}

/// Handles one inbound event at a time and produces the replies for it.
pub struct Dispatcher<S: ShopStore + Clone, G: ChatGateway + Clone> {
    shop: Shop<S, ChatNotifier<G>>,
    sessions: Sessions<S>,
    contacts_text: String,
}

impl<S: ShopStore + Clone, G: ChatGateway + Clone> Dispatcher<S, G> {
    pub fn new(store: S, gateway: G, config: &Config) -> Self {
        let notifier = ChatNotifier::new(gateway, config.group_chat_id);
        let access = AccessPolicy::new(config.admin_ids.iter().copied());

        Self {
            shop: Shop::new(store.clone(), notifier, access),
            sessions: Sessions::new(store, config.session_timeout),
            contacts_text: config.contacts_text.clone(),
        }
    }

    pub fn shop(&self) -> &Shop<S, ChatNotifier<G>> {
        &self.shop
    }

    /// Decodes and executes one event. Failures become a reply, never an error.
    #[tracing::instrument(skip(self, event), fields(user_id = %event.user_id, chat_id = %event.chat_id))]
    pub async fn handle(&self, event: InboundEvent) -> Vec<Reply> {
        let ctx = Context {
            chat_id: event.chat_id,
            actor: self.shop.access.actor(event.user_id),
            display_name: event.display_name.clone(),
        };

        match self.dispatch(&ctx, &event).await {
            Ok(replies) => replies,
            Err(err) => {
                metrics::counter!("bot_errors_total", "kind" => err.kind()).increment(1);
                tracing::info!(error = %err, "Update rejected");
                vec![ctx.reply(err.user_message())]
            }
        }
    }

    async fn dispatch(&self, ctx: &Context, event: &InboundEvent) -> Result<Vec<Reply>> {
        let session = self.sessions.load(ctx.user_id()).await?;
        let command = Command::decode(event, session.is_active())?;

        metrics::counter!("bot_updates_total", "command" => command.name()).increment(1);
        tracing::debug!(command = command.name(), "Dispatching");

        self.execute(ctx, session, command).await
    }

    async fn execute(&self, ctx: &Context, session: Session, command: Command) -> Result<Vec<Reply>> {
        let user_id = ctx.user_id();

        let replies = match command {
            Command::Start => {
                let greeting = match &ctx.display_name {
                    Some(name) => format!("Hello, {name}! Welcome to the shop."),
                    None => "Hello! Welcome to the shop.".to_string(),
                };
                let mut reply = ctx.reply(greeting);
                reply.buttons = reply::menu_rows();
                vec![reply]
            }
            Command::Help => {
                let mut text = reply::HELP_TEXT.to_string();
                if ctx.actor.is_admin() {
                    text.push_str("\n\n");
                    text.push_str(reply::ADMIN_HELP_TEXT);
                }
                vec![ctx.reply(text)]
            }
            Command::Catalog => {
                let products = self.shop.catalog.list().await?;
                let title = if products.is_empty() {
                    "The catalog is empty."
                } else {
                    "Catalog:"
                };
                let mut reply = reply::product_list(ctx.chat_id, title, &products);
                if ctx.actor.is_admin() {
                    reply = reply.with_row(vec![Button::new("Add product", &Command::AddProduct)]);
                }
                vec![reply]
            }
            Command::ProductDetails(product_id) => {
                let product = self.shop.catalog.get(product_id).await?;
                let mut card = reply::product_card(ctx.chat_id, &product);
                if ctx.actor.is_admin() {
                    card = card.with_row(vec![
                        Button::new(
                            "+10 stock",
                            &Command::Restock {
                                product_id,
                                delta: 10,
                            },
                        ),
                        Button::new("Delete", &Command::DeleteProduct(product_id)),
                    ]);
                }
                vec![card]
            }
            Command::AddToCart(product_id) => {
                let product = self.shop.catalog.get(product_id).await?;
                let line = self.shop.cart.increment(user_id, product_id).await?;
                vec![
                    ctx.reply(format!(
                        "{} added to your cart ({} in cart).",
                        product.name, line.quantity
                    ))
                    .with_row(vec![
                        Button::new("Cart", &Command::Cart),
                        Button::new("Catalog", &Command::Catalog),
                    ]),
                ]
            }
            Command::Cart => vec![self.cart_view(ctx).await?],
            Command::Increase(product_id) => {
                self.shop.cart.increment(user_id, product_id).await?;
                vec![self.cart_view(ctx).await?]
            }
            Command::Decrease(product_id) => {
                self.shop.cart.decrement(user_id, product_id).await?;
                vec![self.cart_view(ctx).await?]
            }
            Command::Remove(product_id) => {
                self.shop.cart.remove_item(user_id, product_id).await?;
                vec![self.cart_view(ctx).await?]
            }
            Command::Checkout => {
                if self.shop.cart.summary(user_id).await?.is_empty() {
                    return Err(ShopError::EmptyCart.into());
                }
                self.sessions
                    .save(user_id, &Session::AwaitingContact)
                    .await?;
                vec![ctx.reply(
                    "Please share your phone number so we can confirm the order, or type it in.",
                )]
            }
            Command::ShareContact(phone) => self.place_order(ctx, &session, &phone).await?,
            Command::MyOrders => {
                let orders = self.shop.lifecycle.orders_for(user_id).await?;
                if orders.is_empty() {
                    vec![ctx.reply("You have no orders yet.")]
                } else {
                    let summaries: Vec<String> = orders.iter().map(reply::order_summary).collect();
                    vec![ctx.reply(summaries.join("\n\n"))]
                }
            }
            Command::Contacts => vec![ctx.reply(self.contacts_text.clone())],
            Command::Favorites => {
                let products = self.shop.favorites.list(user_id).await?;
                if products.is_empty() {
                    vec![ctx.reply("You have no favorites yet.")]
                } else {
                    let mut reply = reply::product_list(ctx.chat_id, "Your favorites:", &products);
                    for product in &products {
                        reply = reply.with_row(vec![Button::new(
                            format!("Forget {}", product.name),
                            &Command::RemoveFavorite(product.id),
                        )]);
                    }
                    vec![reply]
                }
            }
            Command::AddFavorite(product_id) => {
                let text = if self.shop.favorites.add(user_id, product_id).await? {
                    "Added to your favorites."
                } else {
                    "Already in your favorites."
                };
                vec![ctx.reply(text)]
            }
            Command::RemoveFavorite(product_id) => {
                let text = if self.shop.favorites.remove(user_id, product_id).await? {
                    "Removed from your favorites."
                } else {
                    "That product is not in your favorites."
                };
                vec![ctx.reply(text)]
            }
            Command::Discounts => {
                let products = self.shop.catalog.discounted().await?;
                let title = if products.is_empty() {
                    "No discounts right now."
                } else {
                    "On sale:"
                };
                vec![reply::product_list(ctx.chat_id, title, &products)]
            }
            Command::Cancel => {
                self.sessions.save(user_id, &Session::Idle).await?;
                let text = if session.is_active() {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                vec![ctx.reply(text)]
            }
            Command::AddProduct => {
                ctx.actor.require_admin("add products")?;
                let form = ProductForm::new();
                let prompt = form.prompt();
                self.sessions
                    .save(user_id, &Session::AddProduct(form))
                    .await?;
                vec![ctx.reply(prompt)]
            }
            Command::DeleteProduct(product_id) => {
                ctx.actor.require_admin("delete products")?;
                self.shop.catalog.delete(product_id).await?;
                vec![ctx.reply(format!("Product {product_id} deleted."))]
            }
            Command::Restock { product_id, delta } => {
                ctx.actor.require_admin("change stock")?;
                let product = self.shop.catalog.adjust_stock(product_id, delta).await?;
                vec![ctx.reply(format!("{}: {} in stock.", product.name, product.stock))]
            }
            Command::Stock => {
                ctx.actor.require_admin("view stock")?;
                let products = self.shop.catalog.list().await?;
                let lines: Vec<String> = products
                    .iter()
                    .map(|p| format!("#{} {}: {}", p.id, p.name, p.stock))
                    .collect();
                let text = if lines.is_empty() {
                    "The catalog is empty.".to_string()
                } else {
                    lines.join("\n")
                };
                vec![ctx.reply(text)]
            }
            Command::Orders(status) => {
                let orders = self.shop.lifecycle.list(&ctx.actor, status).await?;
                if orders.is_empty() {
                    vec![ctx.reply("No orders.")]
                } else {
                    orders
                        .iter()
                        .map(|order| reply::admin_order(ctx.chat_id, order))
                        .collect()
                }
            }
            Command::SetStatus { order_id, status } => {
                let order = self
                    .shop
                    .lifecycle
                    .set_status(order_id, status, &ctx.actor)
                    .await?;
                vec![reply::admin_order(ctx.chat_id, &order)]
            }
            Command::FlowInput(input) => self.continue_flow(ctx, session, &input).await?,
            Command::Ignore => Vec::new(),
            Command::Unknown(_) => {
                vec![ctx.reply("Sorry, I did not understand that. Try /help.")]
            }
        };

        Ok(replies)
    }

    async fn continue_flow(&self, ctx: &Context, session: Session, input: &str) -> Result<Vec<Reply>> {
        match session {
            Session::Idle => Ok(vec![ctx.reply("Sorry, I did not understand that. Try /help.")]),
            Session::AwaitingContact => {
                let phone = validate_phone(input)?;
                self.place_order(ctx, &Session::AwaitingContact, &phone).await
            }
            Session::AddProduct(form) => {
                ctx.actor.require_admin("add products")?;

                match form.accept(input)? {
                    FormProgress::Continue(next) => {
                        let prompt = next.prompt();
                        self.sessions
                            .save(ctx.user_id(), &Session::AddProduct(next))
                            .await?;
                        Ok(vec![ctx.reply(prompt)])
                    }
                    FormProgress::Complete(draft) => {
                        let product = self.shop.catalog.upsert(draft).await?;
                        self.sessions.save(ctx.user_id(), &Session::Idle).await?;

                        let mut card = reply::product_card(ctx.chat_id, &product);
                        card.text = format!("Product #{} saved.\n\n{}", product.id, card.text);
                        Ok(vec![card])
                    }
                }
            }
        }
    }

    /// Checks out the cart with the given contact.
    ///
    /// A pending checkout returns to idle whatever the outcome. Any other
    /// conversation, such as a half-filled product form, is left as it was.
    async fn place_order(
        &self,
        ctx: &Context,
        session: &Session,
        contact: &str,
    ) -> Result<Vec<Reply>> {
        let result = self.shop.orders.checkout(ctx.user_id(), contact).await;
        if matches!(session, Session::AwaitingContact) {
            self.sessions.save(ctx.user_id(), &Session::Idle).await?;
        }

        let order: Order = result?;
        Ok(vec![
            ctx.reply(format!(
                "Thank you! Your order has been placed.\n\n{}",
                reply::order_summary(&order)
            ))
            .with_row(vec![Button::new("My orders", &Command::MyOrders)]),
        ])
    }

    async fn cart_view(&self, ctx: &Context) -> Result<Reply> {
        let summary = self.shop.cart.summary(ctx.user_id()).await?;
        Ok(reply::cart_view(ctx.chat_id, &summary))
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderId, OrderStatus, ProductId};
    use store::{InMemoryShopStore, ProductDraft};

    use super::*;
    use crate::command::Payload;
    use crate::gateway::{OutboundOp, OutboxGateway};

    const ADMIN: UserId = UserId::new(1);
    const ALICE: UserId = UserId::new(100);
    const CHANNEL: ChatId = ChatId::new(-500);

    fn dispatcher() -> (Dispatcher<InMemoryShopStore, OutboxGateway>, OutboxGateway) {
        let gateway = OutboxGateway::new();
        let config = Config {
            admin_ids: vec![ADMIN],
            group_chat_id: Some(CHANNEL),
            ..Config::default()
        };
        (
            Dispatcher::new(InMemoryShopStore::new(), gateway.clone(), &config),
            gateway,
        )
    }

    fn event(user: UserId, payload: Payload) -> InboundEvent {
        InboundEvent {
            user_id: user,
            chat_id: user.private_chat(),
            display_name: None,
            payload,
        }
    }

    fn text(user: UserId, text: &str) -> InboundEvent {
        event(
            user,
            Payload::Text {
                text: text.to_string(),
            },
        )
    }

    fn callback(user: UserId, command: &Command) -> InboundEvent {
        event(
            user,
            Payload::Callback {
                data: command.callback_data().unwrap(),
            },
        )
    }

    async fn seed(d: &Dispatcher<InMemoryShopStore, OutboxGateway>, stock: u32) -> ProductId {
        d.shop()
            .catalog
            .upsert(ProductDraft::new("Tea", Money::from_major(5)).with_stock(stock))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn start_shows_menu() {
        let (d, _) = dispatcher();
        let mut start = text(ALICE, "/start");
        start.display_name = Some("Alice".to_string());

        let replies = d.handle(start).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("Alice"));
        assert_eq!(replies[0].buttons.len(), 3);
    }

    #[tokio::test]
    async fn buttons_drive_the_cart() {
        let (d, _) = dispatcher();
        let tea = seed(&d, 5).await;

        d.handle(callback(ALICE, &Command::AddToCart(tea))).await;
        let replies = d.handle(callback(ALICE, &Command::Increase(tea))).await;
        assert!(replies[0].text.contains("Tea × 2"));

        d.handle(callback(ALICE, &Command::Decrease(tea))).await;
        let replies = d.handle(callback(ALICE, &Command::Decrease(tea))).await;
        assert_eq!(replies[0].text, "Your cart is empty.");
    }

    #[tokio::test]
    async fn checkout_collects_contact_then_places_order() {
        let (d, gateway) = dispatcher();
        let tea = seed(&d, 5).await;
        d.handle(callback(ALICE, &Command::AddToCart(tea))).await;

        let replies = d.handle(callback(ALICE, &Command::Checkout)).await;
        assert!(replies[0].text.contains("phone number"));

        let replies = d.handle(text(ALICE, "not a phone")).await;
        assert!(replies[0].text.contains("does not look like a phone number"));

        let replies = d
            .handle(event(
                ALICE,
                Payload::Contact {
                    phone_number: "+7 900 000 00 01".to_string(),
                },
            ))
            .await;
        assert!(replies[0].text.starts_with("Thank you!"));
        assert_eq!(d.shop().catalog.get(tea).await.unwrap().stock, 4);

        let ops = gateway.drain().await;
        assert!(matches!(&ops[..], [OutboundOp::Send { message, .. }] if message.chat_id == CHANNEL));

        // Back to idle: free text is no longer a phone number.
        let replies = d.handle(text(ALICE, "+7 900 000 00 01")).await;
        assert!(replies[0].text.contains("did not understand"));
    }

    #[tokio::test]
    async fn checkout_of_empty_cart_is_refused() {
        let (d, _) = dispatcher();
        let replies = d.handle(text(ALICE, "/checkout")).await;
        assert_eq!(replies[0].text, "Your cart is empty.");
    }

    #[tokio::test]
    async fn admin_adds_product_step_by_step() {
        let (d, _) = dispatcher();

        d.handle(text(ADMIN, "/add_product")).await;
        for input in ["Green tea", "-", "450", "399.90", "12"] {
            d.handle(text(ADMIN, input)).await;
        }
        let replies = d.handle(text(ADMIN, "-")).await;
        assert!(replies[0].text.starts_with("Product #1 saved."));

        let product = d.shop().catalog.get(ProductId::new(1)).await.unwrap();
        assert_eq!(product.discount_price, Some(Money::from_minor(39_990)));
        assert_eq!(product.stock, 12);
    }

    #[tokio::test]
    async fn shared_contact_keeps_product_form() {
        let (d, _) = dispatcher();
        let tea = seed(&d, 5).await;
        d.handle(callback(ADMIN, &Command::AddToCart(tea))).await;

        d.handle(text(ADMIN, "/add_product")).await;
        d.handle(text(ADMIN, "Green tea")).await;

        let replies = d
            .handle(event(
                ADMIN,
                Payload::Contact {
                    phone_number: "+7 900 000 00 02".to_string(),
                },
            ))
            .await;
        assert!(replies[0].text.starts_with("Thank you!"));

        // The form is still waiting for the description.
        let replies = d.handle(text(ADMIN, "-")).await;
        assert_eq!(replies[0].text, "Enter the price:");
        for input in ["450", "-", "3"] {
            d.handle(text(ADMIN, input)).await;
        }
        let replies = d.handle(text(ADMIN, "-")).await;
        assert!(replies[0].text.starts_with("Product #2 saved."));
    }

    #[tokio::test]
    async fn bad_form_input_reprompts_and_cancel_resets() {
        let (d, _) = dispatcher();
        d.handle(text(ADMIN, "/add_product")).await;
        d.handle(text(ADMIN, "Mug")).await;
        d.handle(text(ADMIN, "-")).await;

        let replies = d.handle(text(ADMIN, "cheap")).await;
        assert!(replies[0].text.starts_with("That is not a price"));
        let replies = d.handle(text(ADMIN, "300")).await;
        assert!(replies[0].text.contains("discount price"));

        let replies = d.handle(text(ADMIN, "/cancel")).await;
        assert_eq!(replies[0].text, "Cancelled.");
        assert!(d.shop().catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn customers_cannot_use_admin_commands() {
        let (d, _) = dispatcher();
        let tea = seed(&d, 5).await;

        for command in ["/add_product", "/stock", "/all_orders", "/restock 1 5"] {
            let replies = d.handle(text(ALICE, command)).await;
            assert_eq!(replies[0].text, "This command is for administrators only.");
        }
        assert_eq!(d.shop().catalog.get(tea).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn admin_moves_order_through_lifecycle() {
        let (d, gateway) = dispatcher();
        let tea = seed(&d, 5).await;
        d.handle(callback(ALICE, &Command::AddToCart(tea))).await;
        d.handle(callback(ALICE, &Command::Checkout)).await;
        d.handle(text(ALICE, "+7 900 000 00 01")).await;
        gateway.drain().await;

        let replies = d.handle(text(ADMIN, "/all_orders pending")).await;
        assert_eq!(replies.len(), 1);
        let processing = replies[0].buttons[0][0].clone();
        assert_eq!(processing.callback_data, "set_status:1:processing");

        let replies = d
            .handle(event(
                ADMIN,
                Payload::Callback {
                    data: processing.callback_data,
                },
            ))
            .await;
        assert!(replies[0].text.contains("(processing)"));

        let replies = d.handle(text(ADMIN, "/set_status 1 completed")).await;
        assert_eq!(
            replies[0].text,
            "An order that is processing cannot become completed."
        );

        let ops = gateway.drain().await;
        assert!(ops.iter().any(|op| matches!(op, OutboundOp::Edit { chat_id, .. } if *chat_id == CHANNEL)));
        let order = d
            .shop()
            .lifecycle
            .get(OrderId::new(1), &Actor::admin(ADMIN))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn favorites_and_discounts() {
        let (d, _) = dispatcher();
        let tea = seed(&d, 5).await;
        d.shop()
            .catalog
            .upsert(
                ProductDraft::new("Mug", Money::from_major(10))
                    .with_discount(Money::from_major(8))
                    .with_stock(1),
            )
            .await
            .unwrap();

        let replies = d.handle(callback(ALICE, &Command::AddFavorite(tea))).await;
        assert_eq!(replies[0].text, "Added to your favorites.");
        let replies = d.handle(callback(ALICE, &Command::AddFavorite(tea))).await;
        assert_eq!(replies[0].text, "Already in your favorites.");

        let replies = d.handle(text(ALICE, "Favorites")).await;
        assert_eq!(replies[0].text, "Your favorites:");

        let replies = d.handle(text(ALICE, "Discounts")).await;
        assert_eq!(replies[0].buttons.len(), 1);
        assert!(replies[0].buttons[0][0].label.starts_with("Mug"));
    }

    #[tokio::test]
    async fn malformed_commands_explain_themselves() {
        let (d, _) = dispatcher();
        let replies = d.handle(text(ALICE, "/details abc")).await;
        assert!(replies[0].text.contains("not a valid product id"));

        let replies = d.handle(text(ALICE, "/details 42")).await;
        assert_eq!(replies[0].text, "Product not found.");
    }
}
